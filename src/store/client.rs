use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::config::{Config, FirestoreConfig};
use crate::store::api_types::{
  encode_fields, ApiCommitRequest, ApiCommitResponse, ApiDocument, ApiListResponse, ApiWrite,
  ApiWriteBody,
};
use crate::store::{Document, DocumentStore, Fields, WriteMode};

const PAGE_SIZE: u32 = 300;

/// Firestore REST API client
#[derive(Clone)]
pub struct FirestoreClient {
  http: reqwest::Client,
  /// API root ending in `/`, e.g. `https://firestore.googleapis.com/v1/`
  api_base: Url,
  /// `projects/{project}/databases/{database}`
  database: String,
  id_token: Option<String>,
}

impl FirestoreClient {
  pub fn new(config: &Config) -> Result<Self> {
    Self::from_parts(&config.firestore, Config::get_id_token())
  }

  pub fn from_parts(firestore: &FirestoreConfig, id_token: Option<String>) -> Result<Self> {
    let mut base = firestore.api_base.clone();
    if !base.ends_with('/') {
      base.push('/');
    }
    let api_base =
      Url::parse(&base).map_err(|e| eyre!("Invalid Firestore API base '{}': {}", base, e))?;

    let http = reqwest::Client::builder()
      .user_agent(concat!("flashsync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      api_base,
      database: firestore.database_path(),
      id_token,
    })
  }

  /// Resource path of the database, used to scope the local cache.
  pub fn database(&self) -> &str {
    &self.database
  }

  fn document_name(&self, collection: &str, id: &str) -> String {
    format!("{}/documents/{}/{}", self.database, collection, id)
  }

  fn url(&self, path: &str) -> Result<Url> {
    self
      .api_base
      .join(path)
      .map_err(|e| eyre!("Failed to build URL for {}: {}", path, e))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let req = self.http.request(method, url);
    match &self.id_token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  /// Turn a non-success response into an error carrying the response body.
  async fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(eyre!("Failed to {}: HTTP {}: {}", what, status, body.trim()))
  }
}

impl DocumentStore for FirestoreClient {
  async fn list(&self, collection: &str) -> Result<Vec<Document>> {
    let mut documents = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
      let mut url = self.url(&format!("{}/documents/{}", self.database, collection))?;
      url
        .query_pairs_mut()
        .append_pair("pageSize", &PAGE_SIZE.to_string());
      if let Some(token) = &page_token {
        url.query_pairs_mut().append_pair("pageToken", token);
      }

      let response = self
        .request(Method::GET, url)
        .send()
        .await
        .map_err(|e| eyre!("Failed to list {}: {}", collection, e))?;
      let page: ApiListResponse = Self::check(response, &format!("list {}", collection))
        .await?
        .json()
        .await
        .map_err(|e| eyre!("Failed to parse {} listing: {}", collection, e))?;

      for doc in page.documents {
        documents.push(doc.into_document()?);
      }

      // Check if we've fetched all pages
      match page.next_page_token {
        Some(token) if !token.is_empty() => page_token = Some(token),
        _ => break,
      }
    }

    Ok(documents)
  }

  async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
    let url = self.url(&self.document_name(collection, id))?;
    let response = self
      .request(Method::GET, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to get {}/{}: {}", collection, id, e))?;

    if response.status() == StatusCode::NOT_FOUND {
      return Ok(None);
    }

    let doc: ApiDocument = Self::check(response, &format!("get {}/{}", collection, id))
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse {}/{}: {}", collection, id, e))?;

    Ok(Some(doc.into_document()?))
  }

  async fn create(&self, collection: &str, fields: Fields) -> Result<String> {
    let url = self.url(&format!("{}/documents/{}", self.database, collection))?;
    let body = ApiWriteBody {
      fields: encode_fields(fields),
    };

    let response = self
      .request(Method::POST, url)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to create document in {}: {}", collection, e))?;
    let doc: ApiDocument = Self::check(response, &format!("create document in {}", collection))
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse created document: {}", e))?;

    Ok(doc.id().to_string())
  }

  async fn set(&self, collection: &str, id: &str, fields: Fields, mode: WriteMode) -> Result<()> {
    let mut url = self.url(&self.document_name(collection, id))?;
    if mode == WriteMode::Merge {
      // Fields outside the mask are left as they are
      let mut query = url.query_pairs_mut();
      for key in fields.keys() {
        query.append_pair("updateMask.fieldPaths", key);
      }
    }
    let body = ApiWriteBody {
      fields: encode_fields(fields),
    };

    let response = self
      .request(Method::PATCH, url)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to write {}/{}: {}", collection, id, e))?;
    Self::check(response, &format!("write {}/{}", collection, id)).await?;

    Ok(())
  }

  async fn delete(&self, collection: &str, id: &str) -> Result<()> {
    let url = self.url(&self.document_name(collection, id))?;
    let response = self
      .request(Method::DELETE, url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to delete {}/{}: {}", collection, id, e))?;
    Self::check(response, &format!("delete {}/{}", collection, id)).await?;

    Ok(())
  }

  async fn stamp(&self, collection: &str, id: &str, field: &str) -> Result<String> {
    let url = self.url(&format!("{}/documents:commit", self.database))?;
    let body = ApiCommitRequest {
      writes: vec![ApiWrite::server_timestamp(
        self.document_name(collection, id),
        field,
      )],
    };

    let response = self
      .request(Method::POST, url)
      .json(&body)
      .send()
      .await
      .map_err(|e| eyre!("Failed to stamp {}/{}: {}", collection, id, e))?;
    let commit: ApiCommitResponse = Self::check(response, &format!("stamp {}/{}", collection, id))
      .await?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse commit response: {}", e))?;

    commit.stamped_time()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(api_base: &str) -> FirestoreClient {
    let config = FirestoreConfig {
      project_id: "study-app".to_string(),
      database: "(default)".to_string(),
      api_base: api_base.to_string(),
    };
    FirestoreClient::from_parts(&config, None).unwrap()
  }

  #[test]
  fn test_document_urls() {
    let c = client("https://firestore.googleapis.com/v1");
    assert_eq!(c.database(), "projects/study-app/databases/(default)");

    let url = c.url(&c.document_name("meta", "globalData")).unwrap();
    assert_eq!(
      url.as_str(),
      "https://firestore.googleapis.com/v1/projects/study-app/databases/(default)/documents/meta/globalData"
    );
  }

  #[test]
  fn test_commit_url() {
    let c = client("http://localhost:8080/v1/");
    let url = c.url(&format!("{}/documents:commit", c.database())).unwrap();
    assert_eq!(
      url.as_str(),
      "http://localhost:8080/v1/projects/study-app/databases/(default)/documents:commit"
    );
  }

  #[test]
  fn test_invalid_api_base_is_rejected() {
    let config = FirestoreConfig {
      project_id: "p".to_string(),
      database: "(default)".to_string(),
      api_base: "not a url".to_string(),
    };
    assert!(FirestoreClient::from_parts(&config, None).is_err());
  }
}
