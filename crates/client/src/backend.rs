//! PackBackend trait defining the calls the reconciler makes.

use async_trait::async_trait;
use context_pack_types::{CancelAck, CreditCheck, PackDetail, StartAnalysisAck};

use crate::error::ClientError;

/// Backend operations used by the job reconciler.
///
/// Implementations:
/// - `HttpBackend`: reqwest client against the REST API
/// - test doubles in the runtime crate
#[async_trait]
pub trait PackBackend: Send + Sync {
    /// Pack detail including every source's current status.
    async fn pack_detail(&self, pack_id: &str) -> Result<PackDetail, ClientError>;

    /// Credit requirement for analyzing one source.
    async fn credit_check(&self, source_id: &str) -> Result<CreditCheck, ClientError>;

    /// Start analysis. `max_chunks` limits a partial run.
    async fn start_analysis(
        &self,
        source_id: &str,
        max_chunks: Option<u32>,
    ) -> Result<StartAnalysisAck, ClientError>;

    /// Ask the backend to stop processing a source.
    async fn cancel(&self, source_id: &str) -> Result<CancelAck, ClientError>;

    /// Download the finished context pack as text.
    async fn download_pack(&self, pack_id: &str) -> Result<String, ClientError>;
}
