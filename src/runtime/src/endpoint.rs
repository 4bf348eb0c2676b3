//! Scoped I/O endpoint for external collaborators.
//!
//! Loading images into a local daemon or pushing them elsewhere happens
//! outside this crate; those collaborators need a loopback listener and an
//! async runtime to drive it. [`IoContext`] owns both for exactly one
//! operation and releases them when it is dropped, whatever the outcome.

use std::future::Future;
use std::net::SocketAddr;

use ocibake_core::error::{BakeError, Result};
use tokio::net::TcpListener;
use tokio::runtime::Runtime;

pub struct IoContext {
    listener: Option<TcpListener>,
    addr: SocketAddr,
    // Declared last so the listener is released before the runtime
    runtime: Runtime,
}

impl IoContext {
    /// Start a runtime and bind a listener on an ephemeral loopback port.
    pub fn bind() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| {
                BakeError::IoError(std::io::Error::new(
                    e.kind(),
                    format!("Failed to start I/O runtime: {}", e),
                ))
            })?;
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0"))?;
        let addr = listener.local_addr()?;
        tracing::debug!(addr = %addr, "I/O endpoint listening");
        Ok(Self {
            listener: Some(listener),
            addr,
            runtime,
        })
    }

    /// Run `op` with a fresh context and close it afterwards, including when
    /// `op` fails.
    pub fn scoped<T, F>(op: F) -> Result<T>
    where
        F: FnOnce(&IoContext) -> Result<T>,
    {
        let context = Self::bind()?;
        let result = op(&context);
        drop(context);
        result
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn listener(&self) -> Option<&TcpListener> {
        self.listener.as_ref()
    }

    /// Drive `future` to completion on this context's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl Drop for IoContext {
    fn drop(&mut self) {
        let _guard = self.runtime.enter();
        self.listener.take();
        tracing::debug!(addr = %self.addr, "I/O endpoint closed");
    }
}
