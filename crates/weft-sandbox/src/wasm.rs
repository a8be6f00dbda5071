//! WebAssembly sandbox backend on wasmtime.
//!
//! CPU time is metered with fuel, memory through a store resource limiter,
//! and wall time plus cancellation through epoch interruption driven by a
//! ticker thread. Modules get no imports at all: no WASI, no host
//! functions, so no clock, randomness, filesystem, or network can leak in.
//!
//! Guest contract: the module exports `memory`, `alloc(len) -> ptr`, and
//! the entry points `run(ptr, len) -> i64` / `merge(ptr, len) -> i64`,
//! where the i64 packs the output as `(ptr << 32) | len`.

use crate::{
    metrics, validate_module_bytes, CancelToken, EntryPoint, ExecutionLimits, ExecutionMetrics,
    ExecutionOutcome, LimitKind, Sandbox, SandboxError, MAX_OUTPUT_BYTES,
};
use async_trait::async_trait;
use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wasmtime::{Config, Engine, Instance, Module, Store, Trap, TypedFunc, UpdateDeadline};
use weft_common::ContentHash;

/// Fuel units treated as one millisecond of CPU time.
const FUEL_PER_MS: u64 = 100_000;

/// Epoch ticker interval; bounds how quickly wall-limit and cancellation
/// interrupts are observed.
const EPOCH_TICK: Duration = Duration::from_millis(10);

/// Compiled modules kept around between executions.
const MODULE_CACHE_CAP: usize = 32;

enum InterruptKind {
    Wall,
    Cancelled,
}

struct MemoryLimiter {
    limit_bytes: usize,
    peak_bytes: usize,
    denied: bool,
}

impl wasmtime::ResourceLimiter for MemoryLimiter {
    fn memory_growing(
        &mut self,
        _current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        if desired > self.limit_bytes {
            self.denied = true;
            return Ok(false);
        }
        self.peak_bytes = self.peak_bytes.max(desired);
        Ok(true)
    }

    fn table_growing(
        &mut self,
        _current: usize,
        _desired: usize,
        _maximum: Option<usize>,
    ) -> anyhow::Result<bool> {
        Ok(true)
    }
}

struct StoreState {
    limiter: MemoryLimiter,
    started: Instant,
    max_wall: Duration,
    cancel: CancelToken,
    interrupt: Option<InterruptKind>,
}

struct CachedModule {
    module: Module,
    last_used: Instant,
}

struct Inner {
    engine: Engine,
    module_cache: Mutex<HashMap<ContentHash, CachedModule>>,
}

/// wasmtime-backed [`Sandbox`].
pub struct WasmSandbox {
    inner: Arc<Inner>,
    ticker_stop: Arc<AtomicBool>,
}

impl WasmSandbox {
    pub fn new() -> Result<Self, SandboxError> {
        let mut config = Config::new();
        config.consume_fuel(true);
        config.epoch_interruption(true);
        let engine = Engine::new(&config)
            .map_err(|e| SandboxError::Internal(format!("engine setup failed: {e}")))?;

        // One ticker drives epoch interruption for every store; each store
        // re-arms its own one-tick deadline from the callback.
        let ticker_stop = Arc::new(AtomicBool::new(false));
        let ticker_engine = engine.clone();
        let stop = Arc::clone(&ticker_stop);
        std::thread::Builder::new()
            .name("weft-sandbox-epoch".to_string())
            .spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    std::thread::sleep(EPOCH_TICK);
                    ticker_engine.increment_epoch();
                }
            })
            .map_err(|e| SandboxError::Internal(format!("ticker spawn failed: {e}")))?;

        Ok(Self {
            inner: Arc::new(Inner {
                engine,
                module_cache: Mutex::new(HashMap::new()),
            }),
            ticker_stop,
        })
    }
}

impl Drop for WasmSandbox {
    fn drop(&mut self) {
        self.ticker_stop.store(true, Ordering::SeqCst);
    }
}

impl Inner {
    fn compile(&self, module_bytes: &[u8]) -> Result<Module, SandboxError> {
        let hash = ContentHash::from_bytes(module_bytes);
        {
            let mut cache = self.module_cache.lock().unwrap();
            if let Some(cached) = cache.get_mut(&hash) {
                cached.last_used = Instant::now();
                return Ok(cached.module.clone());
            }
        }

        let module = Module::new(&self.engine, module_bytes)
            .map_err(|e| SandboxError::InvalidModule(format!("compilation failed: {e}")))?;

        let mut cache = self.module_cache.lock().unwrap();
        if cache.len() >= MODULE_CACHE_CAP {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, cached)| cached.last_used)
                .map(|(k, _)| *k)
            {
                cache.remove(&oldest);
            }
        }
        cache.insert(
            hash,
            CachedModule {
                module: module.clone(),
                last_used: Instant::now(),
            },
        );
        Ok(module)
    }

    fn run_blocking(
        &self,
        module_bytes: &[u8],
        entry: EntryPoint,
        input: &[u8],
        limits: ExecutionLimits,
        cancel: CancelToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        let module = self.compile(module_bytes)?;

        let started = Instant::now();
        let mut store = Store::new(
            &self.engine,
            StoreState {
                limiter: MemoryLimiter {
                    limit_bytes: (limits.max_memory_mb as usize).saturating_mul(1024 * 1024),
                    peak_bytes: 0,
                    denied: false,
                },
                started,
                max_wall: Duration::from_millis(limits.max_wall_ms),
                cancel,
                interrupt: None,
            },
        );
        store.limiter(|state| &mut state.limiter);

        let initial_fuel = limits.max_cpu_ms.saturating_mul(FUEL_PER_MS);
        store
            .set_fuel(initial_fuel)
            .map_err(|e| SandboxError::Internal(format!("fuel setup failed: {e}")))?;

        store.set_epoch_deadline(1);
        store.epoch_deadline_callback(|mut ctx| {
            let state = ctx.data_mut();
            if state.cancel.is_cancelled() {
                state.interrupt = Some(InterruptKind::Cancelled);
                anyhow::bail!("execution cancelled");
            }
            if state.started.elapsed() >= state.max_wall {
                state.interrupt = Some(InterruptKind::Wall);
                anyhow::bail!("wall clock limit exceeded");
            }
            Ok(UpdateDeadline::Continue(1))
        });

        let result = call_guest(&mut store, &module, entry, input);
        let wall_ms = started.elapsed().as_millis() as u64;
        let consumed_fuel = initial_fuel.saturating_sub(store.get_fuel().unwrap_or(0));
        let exec_metrics = ExecutionMetrics {
            wall_ms,
            cpu_ms: consumed_fuel / FUEL_PER_MS,
            peak_memory_mb: (store.data().limiter.peak_bytes / (1024 * 1024)) as u64,
        };

        match result {
            Ok(output) => {
                metrics::EXECUTIONS_OK.inc();
                Ok(ExecutionOutcome {
                    output,
                    metrics: exec_metrics,
                })
            }
            Err(e) => {
                metrics::EXECUTIONS_FAILED.inc();
                Err(classify_failure(&store, e))
            }
        }
    }
}

/// Instantiate and drive the guest contract. Any anyhow error here is
/// classified by the caller.
fn call_guest(
    store: &mut Store<StoreState>,
    module: &Module,
    entry: EntryPoint,
    input: &[u8],
) -> anyhow::Result<Vec<u8>> {
    let instance = Instance::new(&mut *store, module, &[])?;
    let memory = instance
        .get_memory(&mut *store, "memory")
        .ok_or_else(|| anyhow::anyhow!("module does not export `memory`"))?;
    let alloc: TypedFunc<i32, i32> = instance.get_typed_func(&mut *store, "alloc")?;
    let entry_func: TypedFunc<(i32, i32), i64> =
        instance.get_typed_func(&mut *store, entry.export_name())?;

    let input_ptr = if input.is_empty() {
        0
    } else {
        let ptr = alloc.call(&mut *store, input.len() as i32)?;
        memory.write(&mut *store, ptr as u32 as usize, input)?;
        ptr
    };

    let packed = entry_func.call(&mut *store, (input_ptr, input.len() as i32))?;
    let out_ptr = (packed as u64 >> 32) as usize;
    let out_len = (packed as u64 & 0xFFFF_FFFF) as usize;

    if out_len > MAX_OUTPUT_BYTES {
        return Err(anyhow::Error::new(SandboxError::OutputTooLarge));
    }
    let data = memory.data(&*store);
    let end = out_ptr
        .checked_add(out_len)
        .ok_or_else(|| anyhow::anyhow!("result range overflows"))?;
    if end > data.len() {
        return Err(anyhow::anyhow!(
            "result range {out_ptr}..{end} escapes guest memory"
        ));
    }
    Ok(data[out_ptr..end].to_vec())
}

/// Map a guest failure to a typed error. Faults never cross into the host
/// as panics.
fn classify_failure(store: &Store<StoreState>, error: anyhow::Error) -> SandboxError {
    if let Some(explicit) = error.downcast_ref::<SandboxError>() {
        return explicit.clone();
    }
    match store.data().interrupt {
        Some(InterruptKind::Cancelled) => return SandboxError::Cancelled,
        Some(InterruptKind::Wall) => return SandboxError::LimitExceeded(LimitKind::Wall),
        None => {}
    }
    if let Some(trap) = error.downcast_ref::<Trap>() {
        if *trap == Trap::OutOfFuel {
            return SandboxError::LimitExceeded(LimitKind::Cpu);
        }
    }
    if store.data().limiter.denied {
        return SandboxError::LimitExceeded(LimitKind::Memory);
    }
    debug!("[WasmSandbox] Guest trap: {error:#}");
    SandboxError::Trap(format!("{error}"))
}

#[async_trait]
impl Sandbox for WasmSandbox {
    async fn execute(
        &self,
        module: &[u8],
        entry: EntryPoint,
        input: &[u8],
        limits: ExecutionLimits,
        cancel: CancelToken,
    ) -> Result<ExecutionOutcome, SandboxError> {
        self.validate_module(module)?;
        // wasmtime execution is synchronous and CPU-bound; keep it off the
        // async runtime threads.
        let inner = Arc::clone(&self.inner);
        let module = module.to_vec();
        let input = input.to_vec();
        tokio::task::spawn_blocking(move || {
            inner.run_blocking(&module, entry, &input, limits, cancel)
        })
        .await
        .map_err(|e| SandboxError::Internal(format!("execution task failed: {e}")))?
    }

    fn validate_module(&self, module: &[u8]) -> Result<(), SandboxError> {
        validate_module_bytes(module)?;
        wasmparser::validate(module)
            .map_err(|e| SandboxError::InvalidModule(format!("invalid wasm: {e}")))?;
        // No imports means no capabilities: determinism holds by
        // construction.
        for payload in wasmparser::Parser::new(0).parse_all(module) {
            let payload =
                payload.map_err(|e| SandboxError::InvalidModule(format!("parse error: {e}")))?;
            if let wasmparser::Payload::ImportSection(reader) = payload {
                if reader.count() > 0 {
                    return Err(SandboxError::InvalidModule(
                        "module declares imports; sandboxed modules get no host capabilities"
                            .to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}
