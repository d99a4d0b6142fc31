//! In-memory `PackBackend` for reconciler and session tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use context_pack_client::{ClientError, PackBackend};
use context_pack_types::{
    CancelAck, CreditCheck, PackDetail, SourceDetail, StartAnalysisAck,
};

#[derive(Default)]
pub struct FakeBackend {
    pack: Mutex<PackDetail>,
    credits: Mutex<HashMap<String, CreditCheck>>,
    calls: Mutex<Vec<String>>,
    fail_polls: AtomicUsize,
    fail_credit_checks: AtomicUsize,
    fail_starts: AtomicUsize,
    fail_download: AtomicBool,
}

impl FakeBackend {
    pub fn with_sources(sources: Vec<SourceDetail>) -> Self {
        let backend = Self::default();
        backend.set_sources(sources);
        backend
    }

    pub fn set_sources(&self, sources: Vec<SourceDetail>) {
        let mut pack = self.pack.lock().unwrap();
        pack.pack_id = "pack-1".to_string();
        pack.sources = sources;
    }

    pub fn set_credit_check(&self, source_id: &str, required: u32, balance: u32, total_chunks: u32) {
        self.credits.lock().unwrap().insert(
            source_id.to_string(),
            CreditCheck {
                source_id: source_id.to_string(),
                total_chunks,
                credits_required: required,
                user_credits: balance,
                has_unlimited: false,
                can_proceed: balance >= required,
                credits_needed: required.saturating_sub(balance),
            },
        );
    }

    pub fn fail_next_polls(&self, n: usize) {
        self.fail_polls.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_credit_checks(&self, n: usize) {
        self.fail_credit_checks.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_starts(&self, n: usize) {
        self.fail_starts.store(n, Ordering::SeqCst);
    }

    pub fn fail_downloads(&self) {
        self.fail_download.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn unavailable(url: &str) -> ClientError {
    ClientError::Status {
        url: url.to_string(),
        status: 503,
        body: "unavailable".to_string(),
    }
}

#[async_trait]
impl PackBackend for FakeBackend {
    async fn pack_detail(&self, pack_id: &str) -> Result<PackDetail, ClientError> {
        self.record(format!("pack:{pack_id}"));
        if Self::take_failure(&self.fail_polls) {
            return Err(unavailable("/api/packs"));
        }
        Ok(self.pack.lock().unwrap().clone())
    }

    async fn credit_check(&self, source_id: &str) -> Result<CreditCheck, ClientError> {
        self.record(format!("credit:{source_id}"));
        if Self::take_failure(&self.fail_credit_checks) {
            return Err(unavailable("/api/sources/credit-check"));
        }
        self.credits
            .lock()
            .unwrap()
            .get(source_id)
            .cloned()
            .ok_or_else(|| unavailable("/api/sources/credit-check"))
    }

    async fn start_analysis(
        &self,
        source_id: &str,
        max_chunks: Option<u32>,
    ) -> Result<StartAnalysisAck, ClientError> {
        self.record(format!("start:{source_id}:{max_chunks:?}"));
        if Self::take_failure(&self.fail_starts) {
            return Err(unavailable("/api/sources/start-analysis"));
        }
        Ok(StartAnalysisAck {
            job_id: Some("job-1".to_string()),
            status: Some("processing".to_string()),
            message: None,
        })
    }

    async fn cancel(&self, source_id: &str) -> Result<CancelAck, ClientError> {
        self.record(format!("cancel:{source_id}"));
        let mut pack = self.pack.lock().unwrap();
        for source in pack.sources.iter_mut().filter(|s| s.source_id == source_id) {
            source.status = "cancelled".to_string();
        }
        Ok(CancelAck {
            success: true,
            message: None,
        })
    }

    async fn download_pack(&self, pack_id: &str) -> Result<String, ClientError> {
        self.record(format!("download:{pack_id}"));
        if self.fail_download.load(Ordering::SeqCst) {
            return Err(ClientError::Timeout {
                url: format!("/api/packs/{pack_id}/download"),
                timeout: Duration::from_secs(60),
            });
        }
        Ok("# Context Pack\n".to_string())
    }
}
