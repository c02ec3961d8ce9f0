//! Turning a flaky page source into one trustworthy credit number.

pub mod consensus;
pub mod retry;

use async_trait::async_trait;

use crate::error::ExtractionFailure;
use crate::source::Sampler;
use crate::types::Extraction;

pub use consensus::ConsensusReader;
pub use retry::RetryOrchestrator;

/// One complete extraction round. The retry orchestrator only sees this seam.
#[async_trait]
pub trait CreditReader: Send + Sync {
    async fn read(&self) -> Result<Extraction, ExtractionFailure>;
}

/// A consensus reader bound to the sampler it polls.
pub struct SampledReader {
    reader: ConsensusReader,
    sampler: Box<dyn Sampler>,
}

impl SampledReader {
    pub fn new(reader: ConsensusReader, sampler: Box<dyn Sampler>) -> Self {
        Self { reader, sampler }
    }
}

#[async_trait]
impl CreditReader for SampledReader {
    async fn read(&self) -> Result<Extraction, ExtractionFailure> {
        self.reader.extract(self.sampler.as_ref()).await
    }
}
