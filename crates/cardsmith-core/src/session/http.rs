//! REST session backend over HTTP.

use super::{
    BoxFuture, CreateDesignRequest, DesignCreated, DesignState, FinalizedDesign,
    InitSessionRequest, LinkDesignRequest, SaveSessionRequest, SessionBackend, SessionError,
    SessionRecord, SessionResult,
};
use crate::templates::{TemplatePage, TemplateQuery};
use crate::upload::{StoredImage, UploadFile};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Talks to the `/api` endpoints of a Cardsmith server.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    async fn read<T: DeserializeOwned>(response: reqwest::Response) -> SessionResult<T> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SessionError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SessionError::Status {
                status: status.as_u16(),
                message,
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::Serialization(e.to_string()))
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> SessionResult<T> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Self::read(response).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SessionResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| SessionError::Network(e.to_string()))?;
        Self::read(response).await
    }
}

impl SessionBackend for HttpBackend {
    fn init_session(&self, request: InitSessionRequest) -> BoxFuture<'_, SessionResult<SessionRecord>> {
        Box::pin(async move { self.post("work-session/init", &request).await })
    }

    fn save_session(&self, request: SaveSessionRequest) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            let _: serde_json::Value = self.post("work-session/save", &request).await?;
            Ok(())
        })
    }

    fn link_design(&self, request: LinkDesignRequest) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            let _: serde_json::Value = self.post("work-session/link-design", &request).await?;
            Ok(())
        })
    }

    fn create_design(&self, request: CreateDesignRequest) -> BoxFuture<'_, SessionResult<DesignCreated>> {
        Box::pin(async move { self.post("design", &request).await })
    }

    fn load_design(&self, id: &str) -> BoxFuture<'_, SessionResult<DesignState>> {
        let path = format!("design/{id}/edit");
        Box::pin(async move { self.get(&path, &[]).await })
    }

    fn finalize_design(&self, id: &str) -> BoxFuture<'_, SessionResult<FinalizedDesign>> {
        let path = format!("design/{id}/finalize");
        Box::pin(async move { self.post(&path, &serde_json::json!({})).await })
    }

    fn upload_image(&self, file: UploadFile) -> BoxFuture<'_, SessionResult<StoredImage>> {
        Box::pin(async move { self.post("upload", &file.to_request()).await })
    }

    fn list_templates(&self, query: TemplateQuery) -> BoxFuture<'_, SessionResult<TemplatePage>> {
        Box::pin(async move {
            let mut params = vec![
                ("page", query.page.to_string()),
                ("per_page", query.per_page.to_string()),
            ];
            if let Some(product_id) = query.product_id {
                params.push(("product_id", product_id));
            }
            self.get("templates", &params).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base() {
        let backend = HttpBackend::new("http://localhost:3040/");
        assert_eq!(backend.url("design/1/edit"), "http://localhost:3040/api/design/1/edit");
    }
}
