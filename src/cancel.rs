//! Cooperative cancellation shared by the monitor loop and the resolver.

use anyhow::{Context, Result};
use signal_hook::consts::signal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Flag checked at every suspension point of the monitor
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that trips when the process receives SIGINT.
    /// A second SIGINT while the first is still being honoured exits immediately.
    pub fn on_ctrl_c() -> Result<Self> {
        let token = Self::new();
        signal_hook::flag::register_conditional_shutdown(signal::SIGINT, 1, Arc::clone(&token.flag))
            .context("Failed to set Ctrl+C handler")?;
        signal_hook::flag::register(signal::SIGINT, Arc::clone(&token.flag))
            .context("Failed to set Ctrl+C handler")?;
        Ok(token)
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());

        token.cancel();
        assert!(other.is_cancelled());
    }
}
