use async_trait::async_trait;
use octocrab::Octocrab;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("github api error: {0}")]
    Api(#[from] octocrab::Error),
    #[error("document {0} is not valid json: {1}")]
    Malformed(String, #[source] serde_json::Error),
    #[error("document {0} has no readable content")]
    Empty(String),
}

/// A named-JSON-document store. The GitHub-backed implementation is the
/// real one; tests swap in an in-memory store.
///
/// There is no read-modify-write atomicity across processes: two bots
/// pointed at the same repository can overwrite each other. We run a
/// single process, so this is a documented limitation rather than
/// something the adapter papers over.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetches a document by name. A missing document reads as an empty
    /// JSON object; callers treat absence as "no data yet".
    async fn read(&self, name: &str) -> Result<Value, StoreError>;

    /// Creates or replaces a document. Looks up the current revision
    /// first so the hosting API accepts the update; a missing document
    /// is created fresh.
    async fn write(&self, name: &str, value: &Value) -> Result<(), StoreError>;

    /// Removes a document. Deleting a document that does not exist
    /// succeeds.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

/// Document store over a GitHub repository's contents API. Each
/// document is one JSON file at the repo root; revisions are the blob
/// shas GitHub hands back.
pub struct GithubStore {
    octocrab: Octocrab,
    owner: String,
    repo: String,
}

impl GithubStore {
    pub fn new(octocrab: Octocrab, owner: String, repo: String) -> Self {
        Self { octocrab, owner, repo }
    }

    /// Current blob sha of the document, or None if it does not exist.
    async fn current_sha(&self, name: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .octocrab
            .repos(&self.owner, &self.repo)
            .get_content()
            .path(name)
            .send()
            .await;
        match result {
            Ok(contents) => Ok(contents.items.into_iter().next().map(|item| item.sha)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait]
impl DocumentStore for GithubStore {
    async fn read(&self, name: &str) -> Result<Value, StoreError> {
        let result = self
            .octocrab
            .repos(&self.owner, &self.repo)
            .get_content()
            .path(name)
            .send()
            .await;
        let contents = match result {
            Ok(contents) => contents,
            Err(err) if is_not_found(&err) => return Ok(empty_object()),
            Err(err) => return Err(err.into()),
        };
        let item = contents
            .items
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Empty(name.to_string()))?;
        let text = item
            .decoded_content()
            .ok_or_else(|| StoreError::Empty(name.to_string()))?;
        serde_json::from_str(&text).map_err(|err| StoreError::Malformed(name.to_string(), err))
    }

    async fn write(&self, name: &str, value: &Value) -> Result<(), StoreError> {
        let body = serde_json::to_string_pretty(value)
            .map_err(|err| StoreError::Malformed(name.to_string(), err))?;
        let repos = self.octocrab.repos(&self.owner, &self.repo);
        match self.current_sha(name).await? {
            Some(sha) => {
                repos
                    .update_file(name, format!("Update {name}"), body, sha)
                    .send()
                    .await?;
            }
            None => {
                repos
                    .create_file(name, format!("Create {name}"), body)
                    .send()
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        let Some(sha) = self.current_sha(name).await? else {
            return Ok(());
        };
        let result = self
            .octocrab
            .repos(&self.owner, &self.repo)
            .delete_file(name, format!("Delete {name}"), sha)
            .send()
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

pub fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}
