use bytes::Bytes;
use reqwest::{Method, StatusCode, Url};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    /// ページ遷移（オフライン時は代替ドキュメントを返す）
    Navigate,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub mode: RequestMode,
}

impl InterceptedRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Other,
        }
    }

    pub fn navigate(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
            mode: RequestMode::Navigate,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// キャッシュのキー。フラグメントは含めない
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// 同一オリジン
    Basic,
    Cors,
    Opaque,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterceptedResponse {
    pub status: StatusCode,
    pub response_type: ResponseType,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl InterceptedResponse {
    pub fn new(status: StatusCode, response_type: ResponseType, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            response_type,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// 200 かつ同一オリジンのレスポンスだけをキャッシュに入れる
    pub fn is_cacheable(&self) -> bool {
        self.status == StatusCode::OK && self.response_type == ResponseType::Basic
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Api,
    Static,
}

/// フェッチ処理の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Network(InterceptedResponse),
    Cache(InterceptedResponse),
    /// ネットワークにもキャッシュにも無い
    Offline,
}

impl FetchOutcome {
    pub fn response(&self) -> Option<&InterceptedResponse> {
        match self {
            FetchOutcome::Network(response) | FetchOutcome::Cache(response) => Some(response),
            FetchOutcome::Offline => None,
        }
    }

    pub fn is_from_cache(&self) -> bool {
        matches!(self, FetchOutcome::Cache(_))
    }
}
