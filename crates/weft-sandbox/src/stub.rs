//! Stub sandbox backend.
//!
//! Executes native closures instead of bytecode. Used by tests and by
//! embedders that want orchestration without a WASM runtime; module bytes
//! are treated as an opaque tag.

use crate::{
    CancelToken, EntryPoint, ExecutionLimits, ExecutionMetrics, ExecutionOutcome, Sandbox,
    SandboxError, MAX_MODULE_BYTES, MAX_OUTPUT_BYTES,
};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

type StubFn = Arc<dyn Fn(&[u8]) -> Result<Vec<u8>, SandboxError> + Send + Sync>;

/// Sandbox that runs supplied closures for `run` and `merge`.
pub struct StubSandbox {
    run: StubFn,
    merge: StubFn,
    /// Artificial latency before each execution, for timeout tests.
    delay: Option<Duration>,
}

impl StubSandbox {
    pub fn new(
        run: impl Fn(&[u8]) -> Result<Vec<u8>, SandboxError> + Send + Sync + 'static,
        merge: impl Fn(&[u8]) -> Result<Vec<u8>, SandboxError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            run: Arc::new(run),
            merge: Arc::new(merge),
            delay: None,
        }
    }

    /// Identity behavior: `run` echoes, `merge` concatenates the decoded
    /// item list.
    pub fn identity() -> Self {
        Self::new(
            |input| Ok(input.to_vec()),
            |input| decode_merge_input(input).map(|items| items.concat()),
        )
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Decode the length-prefixed item list handed to `merge`.
pub fn decode_merge_input(input: &[u8]) -> Result<Vec<Vec<u8>>, SandboxError> {
    let bad = || SandboxError::Trap("malformed merge input".to_string());
    if input.len() < 4 {
        return Err(bad());
    }
    let count = u32::from_le_bytes(input[..4].try_into().unwrap()) as usize;
    let mut items = Vec::with_capacity(count);
    let mut offset = 4;
    for _ in 0..count {
        if offset + 4 > input.len() {
            return Err(bad());
        }
        let len = u32::from_le_bytes(input[offset..offset + 4].try_into().unwrap()) as usize;
        offset += 4;
        if offset + len > input.len() {
            return Err(bad());
        }
        items.push(input[offset..offset + len].to_vec());
        offset += len;
    }
    Ok(items)
}

#[async_trait]
impl Sandbox for StubSandbox {
    async fn execute(
        &self,
        _module: &[u8],
        entry: EntryPoint,
        input: &[u8],
        limits: ExecutionLimits,
        cancel: CancelToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let started = Instant::now();
        if let Some(delay) = self.delay {
            // Honor the wall bound and cancellation while sleeping, like a
            // metered backend would.
            let wall = Duration::from_millis(limits.max_wall_ms);
            let mut slept = Duration::ZERO;
            let tick = Duration::from_millis(5);
            while slept < delay {
                if cancel.is_cancelled() {
                    return Err(SandboxError::Cancelled);
                }
                if slept >= wall {
                    return Err(SandboxError::LimitExceeded(crate::LimitKind::Wall));
                }
                tokio::time::sleep(tick).await;
                slept += tick;
            }
        }
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let func = match entry {
            EntryPoint::Run => &self.run,
            EntryPoint::Merge => &self.merge,
        };
        let output = func(input)?;
        if output.len() > MAX_OUTPUT_BYTES {
            return Err(SandboxError::OutputTooLarge);
        }
        Ok(ExecutionOutcome {
            output,
            metrics: ExecutionMetrics {
                wall_ms: started.elapsed().as_millis() as u64,
                cpu_ms: 0,
                peak_memory_mb: 0,
            },
        })
    }

    fn validate_module(&self, module: &[u8]) -> Result<(), SandboxError> {
        if module.is_empty() {
            return Err(SandboxError::InvalidModule("empty module".to_string()));
        }
        if module.len() > MAX_MODULE_BYTES {
            return Err(SandboxError::InvalidModule("module too large".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_merge_input;

    #[tokio::test]
    async fn identity_round_trips() {
        let sandbox = StubSandbox::identity();
        let outcome = sandbox
            .execute(
                b"tag",
                EntryPoint::Run,
                b"hello",
                ExecutionLimits::default(),
                CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(outcome.output, b"hello");

        let merged = sandbox
            .execute(
                b"tag",
                EntryPoint::Merge,
                &encode_merge_input(&[b"he".to_vec(), b"llo".to_vec()]),
                ExecutionLimits::default(),
                CancelToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(merged.output, b"hello");
    }

    #[tokio::test]
    async fn delay_respects_wall_limit() {
        let sandbox = StubSandbox::identity().with_delay(Duration::from_millis(500));
        let limits = ExecutionLimits {
            max_wall_ms: 30,
            ..Default::default()
        };
        let err = sandbox
            .execute(b"tag", EntryPoint::Run, b"x", limits, CancelToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, SandboxError::LimitExceeded(crate::LimitKind::Wall));
    }

    #[test]
    fn merge_decoding_rejects_garbage() {
        assert!(decode_merge_input(b"").is_err());
        assert!(decode_merge_input(&[9, 0, 0, 0]).is_err());
        let ok = encode_merge_input(&[b"a".to_vec()]);
        assert_eq!(decode_merge_input(&ok).unwrap(), vec![b"a".to_vec()]);
    }
}
