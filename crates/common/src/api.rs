use crate::config::Config;
use crate::error::{Error, Result};
use faststr::FastStr;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const TENANT_HEADER: &str = "X-Tenant-Id";
const SUCCESS: &str = "success";
const FALLBACK_CODE: i64 = 9999;

/// Envelope every backend endpoint answers with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub status:        Option<FastStr>,
    pub data:          Option<T>,
    #[serde(default)]
    pub message:       Option<FastStr>,
    #[serde(default)]
    pub error_message: Option<FastStr>,
    #[serde(default)]
    pub error:         Option<serde_json::Value>,
    #[serde(default)]
    pub details:       Option<serde_json::Value>,
    #[serde(default)]
    pub result_code:   Option<i64>,
}

impl<T> ApiResponse<T> {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(SUCCESS)
    }

    /// Most specific message the server sent back, if any.
    pub fn detail(&self) -> Option<FastStr> {
        self.message
            .clone()
            .or_else(|| self.error_message.clone())
            .or_else(|| self.error.as_ref().and_then(value_text))
            .or_else(|| self.details.as_ref().and_then(value_text))
    }

    pub fn reason(&self) -> FastStr {
        self.detail()
            .unwrap_or_else(|| FastStr::from_static_str("API call failed"))
    }

    pub fn into_result(self) -> Result<Option<T>> {
        if self.is_success() {
            return Ok(self.data);
        }
        Err(Error::ApiError {
            code:    self.result_code.unwrap_or(FALLBACK_CODE),
            message: self.reason(),
        })
    }
}

fn value_text(value: &serde_json::Value) -> Option<FastStr> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(text) if text.is_empty() => None,
        serde_json::Value::String(text) => Some(FastStr::new(text)),
        other => Some(other.to_string().into()),
    }
}

/// List payloads come back in one of three shapes depending on the endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PagedData<T> {
    DataList {
        #[serde(rename = "dataList")]
        data_list: Vec<T>,
    },
    Content {
        content: Vec<T>,
    },
    Items(Vec<T>),
}

impl<T> PagedData<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::DataList { data_list } => data_list,
            Self::Content { content } => content,
            Self::Items(items) => items,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http:      Client,
    base_url:  FastStr,
    tenant_id: Option<FastStr>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.api_base_url.clone(),
            tenant_id: config.tenant_id.clone(),
        })
    }

    pub fn tenant_id(&self) -> Option<&FastStr> {
        self.tenant_id.as_ref()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        self.send(self.request(Method::GET, path).query(query)).await
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(Method::POST, path).json(body)).await
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<Option<T>>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(self.request(Method::PUT, path).json(body)).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        self.send(self.request(Method::DELETE, path).query(query)).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path));
        match &self.tenant_id {
            Some(tenant) => builder.header(TENANT_HEADER, tenant.as_str()),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;
        debug!(%url, status = status.as_u16(), bytes = body.len(), "api response");

        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "api request failed");
            return Err(match serde_json::from_str::<ApiResponse<serde_json::Value>>(&body) {
                Ok(envelope) => Error::ApiError {
                    code:    i64::from(status.as_u16()),
                    message: envelope.detail().unwrap_or_else(|| FastStr::new(&body)),
                },
                Err(_) => Error::InvalidResponseData(body.into(), status.as_u16()),
            });
        }

        serde_json::from_str::<ApiResponse<T>>(&body)?.into_result()
    }
}
