//! Post-response hooks.
//!
//! A [`HookedBody`] wraps a response body and owns a [`PostResponseHooks`]
//! list. The server drops the body once the last frame has been written (or
//! the client went away); at that point the hooks are handed to a background
//! task, so they never delay the response itself.

use bytes::Bytes;
use http_body::{Body, Frame, SizeHint};
use pin_project_lite::pin_project;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

type Hook = Box<dyn FnOnce() + Send + 'static>;

/// Ordered callbacks to run after a response has been sent.
#[derive(Default)]
pub struct PostResponseHooks {
    hooks: Vec<Hook>,
}

impl PostResponseHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hook: impl FnOnce() + Send + 'static) {
        self.hooks.push(Box::new(hook));
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run every hook in order on the current thread.
    pub fn run(self) {
        for hook in self.hooks {
            hook();
        }
    }

    /// Run the hooks on a spawned tokio task, or inline outside a runtime.
    pub fn run_detached(self) {
        if self.hooks.is_empty() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { self.run() });
            }
            Err(_) => {
                tracing::warn!("No tokio runtime for post-response hooks, running inline");
                self.run();
            }
        }
    }
}

impl fmt::Debug for PostResponseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostResponseHooks")
            .field("len", &self.hooks.len())
            .finish()
    }
}

struct HookGuard(Option<PostResponseHooks>);

impl Drop for HookGuard {
    fn drop(&mut self) {
        if let Some(hooks) = self.0.take() {
            hooks.run_detached();
        }
    }
}

pin_project! {
    /// Response body that fires its hooks when dropped.
    pub struct HookedBody<B> {
        #[pin]
        inner: B,
        guard: HookGuard,
    }
}

impl<B> HookedBody<B> {
    pub fn new(inner: B, hooks: PostResponseHooks) -> Self {
        Self {
            inner,
            guard: HookGuard(Some(hooks)),
        }
    }

    /// Number of hooks still pending.
    pub fn pending_hooks(&self) -> usize {
        self.guard.0.as_ref().map_or(0, PostResponseHooks::len)
    }
}

impl<B: From<Bytes>> From<Bytes> for HookedBody<B> {
    fn from(bytes: Bytes) -> Self {
        Self::new(B::from(bytes), PostResponseHooks::new())
    }
}

impl<B: fmt::Debug> fmt::Debug for HookedBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookedBody")
            .field("inner", &self.inner)
            .field("pending_hooks", &self.pending_hooks())
            .finish()
    }
}

impl<B: Body> Body for HookedBody<B> {
    type Data = B::Data;
    type Error = B::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.project().inner.poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
