//! # In-process worker runner.
//!
//! Some units are cheaper as futures than as subprocesses. A
//! [`WorkerFactory`] produces a **fresh future per attempt** (no shared
//! mutable state between restarts; share explicitly via `Arc` inside the
//! closure if needed). Factories are registered by name on the supervisor
//! builder at startup, and a process config references one by that name
//! instead of carrying a command vector.
//!
//! [`WorkerRunner`] drives one factory invocation under the same
//! [`Runner`](crate::runner::Runner) contract as a subprocess:
//! `kill(Terminate)` cancels the worker's token (cooperative),
//! `kill(Kill)` abandons the future outright.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ProcessError;
use crate::runner::contract::{OnStarted, RunOutcome, Runner, StopSignal};

/// Factory for in-process work: invoked once per attempt.
///
/// The returned exit code follows subprocess conventions: `0` is success,
/// anything else maps the attempt to the errored state.
#[async_trait]
pub trait WorkerFactory: Send + Sync + 'static {
    /// Runs one attempt until completion or cancellation of `ctx`.
    ///
    /// Implementations should check `ctx.is_cancelled()` at safe points and
    /// return promptly when asked to stop.
    async fn run(&self, ctx: CancellationToken) -> Result<i32, ProcessError>;
}

/// Function-backed worker factory.
///
/// Wraps a closure that *creates* a new future per attempt.
pub struct WorkerFn<F> {
    f: F,
}

impl<F, Fut> WorkerFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<i32, ProcessError>> + Send + 'static,
{
    /// Creates a new function-backed worker factory.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the factory and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<dyn WorkerFactory> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> WorkerFactory for WorkerFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<i32, ProcessError>> + Send + 'static,
{
    async fn run(&self, ctx: CancellationToken) -> Result<i32, ProcessError> {
        (self.f)(ctx).await
    }
}

/// Named registry of worker factories.
///
/// Populated through explicit registration on the supervisor builder;
/// there is no discovery or dynamic loading.
#[derive(Default)]
pub struct WorkerRegistry {
    map: HashMap<String, Arc<dyn WorkerFactory>>,
}

impl WorkerRegistry {
    /// Registers `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn WorkerFactory>) {
        self.map.insert(name.into(), factory);
    }

    /// Resolves a worker reference.
    pub fn get(&self, name: &str) -> Option<Arc<dyn WorkerFactory>> {
        self.map.get(name).cloned()
    }
}

/// Runner for one in-process worker attempt.
pub struct WorkerRunner {
    factory: Arc<dyn WorkerFactory>,
    killed: AtomicBool,
    terminate: CancellationToken,
    force: CancellationToken,
}

impl WorkerRunner {
    /// Creates a runner for one attempt of `factory`.
    pub fn new(factory: Arc<dyn WorkerFactory>) -> Self {
        Self {
            factory,
            killed: AtomicBool::new(false),
            terminate: CancellationToken::new(),
            force: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl Runner for WorkerRunner {
    async fn run(&self, on_started: OnStarted) -> Result<RunOutcome, ProcessError> {
        // Workers have no OS pid of their own.
        on_started(None);

        let work = self.factory.run(self.terminate.child_token());
        tokio::select! {
            res = work => {
                let code = res?;
                if self.killed.load(Ordering::SeqCst) {
                    Ok(RunOutcome::forced_stop(None))
                } else {
                    Ok(RunOutcome::exited(code, None))
                }
            }
            _ = self.force.cancelled() => Ok(RunOutcome::forced_stop(None)),
        }
    }

    fn kill(&self, signal: StopSignal) {
        self.killed.store(true, Ordering::SeqCst);
        match signal {
            StopSignal::Terminate => self.terminate.cancel(),
            StopSignal::Kill => self.force.cancel(),
        }
    }
}
