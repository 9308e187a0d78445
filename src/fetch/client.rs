use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Lets collaborators be swapped for decorated
/// or mocked clients without touching the callers.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
