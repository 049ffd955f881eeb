//! Contexto por llamada: identidad del llamador (puesta por el middleware de
//! autenticación) y señal de cancelación del ámbito de la RPC.

use tokio::sync::watch;

use flow_core::Id;

use crate::error::{RpcError, RpcResult};

/// Señal de cancelación observable. Se considera cancelada cuando el
/// `CancelHandle` la dispara o cuando éste se suelta.
#[derive(Clone, Debug)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Completa cuando la llamada se cancela.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Extremo que cancela la llamada (lo conserva el transporte).
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

fn cancellation() -> (Cancellation, CancelHandle) {
    let (tx, rx) = watch::channel(false);
    (Cancellation { rx }, CancelHandle { tx })
}

#[derive(Clone, Debug)]
pub struct CallContext {
    user: Option<Id>,
    cancel: Cancellation,
}

impl CallContext {
    pub fn authenticated(user: Id) -> (Self, CancelHandle) {
        let (cancel, handle) = cancellation();
        (Self { user: Some(user),
                cancel },
         handle)
    }

    /// Contexto sin identidad (middleware sin credenciales).
    pub fn anonymous() -> (Self, CancelHandle) {
        let (cancel, handle) = cancellation();
        (Self { user: None, cancel }, handle)
    }

    pub fn user(&self) -> RpcResult<Id> {
        self.user.ok_or(RpcError::Unauthenticated)
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_the_handle_cancels() {
        let (ctx, handle) = CallContext::authenticated(Id::new());
        assert!(!ctx.cancellation().is_cancelled());
        drop(handle);
        assert!(ctx.cancellation().is_cancelled());
        ctx.cancellation().cancelled().await;
    }

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (ctx, handle) = CallContext::authenticated(Id::new());
        let waiter = tokio::spawn({
            let ctx = ctx.clone();
            async move { ctx.cancellation().cancelled().await }
        });
        handle.cancel();
        waiter.await.unwrap();
        assert!(ctx.cancellation().is_cancelled());
    }

    #[test]
    fn anonymous_caller_is_unauthenticated() {
        let (ctx, _handle) = CallContext::anonymous();
        assert_eq!(ctx.user(), Err(RpcError::Unauthenticated));
    }
}
