//! Namespace stack for nested metric groups.
//!
//! A `Namespace` is owned by one call context (one request, one task), so it
//! needs no locking. `enter` hands back a `Frame` guard; the frame truncates
//! the stack when dropped, which also happens while unwinding from a panic or
//! when a `?` leaves the scope early.

use std::ops::{Deref, DerefMut};

/// Ordered segments of the currently entered groups.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Namespace {
    segments: Vec<String>,
}

impl Namespace {
    pub fn new() -> Self {
        Self { segments: Vec::new() }
    }

    /// Number of active frames.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Push `segment` until the returned frame is dropped.
    pub fn enter(&mut self, segment: impl Into<String>) -> Frame<'_> {
        let mark = self.segments.len();
        self.segments.push(segment.into());
        Frame { ns: self, mark }
    }

    /// Join active segments and `leaf` with `.`.
    pub fn resolve(&self, leaf: &str) -> String {
        if self.segments.is_empty() {
            return leaf.to_string();
        }
        let cap = self.segments.iter().map(|s| s.len() + 1).sum::<usize>() + leaf.len();
        let mut out = String::with_capacity(cap);
        for seg in &self.segments {
            out.push_str(seg);
            out.push('.');
        }
        out.push_str(leaf);
        out
    }
}

/// Scope handle returned by [`Namespace::enter`].
///
/// Derefs to the namespace so frames nest: `frame.enter("b")`.
#[derive(Debug)]
pub struct Frame<'a> {
    ns: &'a mut Namespace,
    mark: usize,
}

impl Frame<'_> {
    /// Explicit exit; same effect as dropping the frame.
    pub fn exit(self) {}
}

impl Deref for Frame<'_> {
    type Target = Namespace;

    fn deref(&self) -> &Namespace {
        &*self.ns
    }
}

impl DerefMut for Frame<'_> {
    fn deref_mut(&mut self) -> &mut Namespace {
        &mut *self.ns
    }
}

impl Drop for Frame<'_> {
    fn drop(&mut self) {
        self.ns.segments.truncate(self.mark);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_frames_accumulate_and_pop() {
        let mut ns = Namespace::new();
        {
            let mut outer = ns.enter("rack.request");
            {
                let inner = outer.enter("status");
                assert_eq!(inner.resolve("200"), "rack.request.status.200");
                assert_eq!(inner.depth(), 2);
            }
            assert_eq!(outer.resolve("total"), "rack.request.total");
        }
        assert_eq!(ns.depth(), 0);
        assert_eq!(ns.resolve("c"), "c");
    }

    #[test]
    fn explicit_exit_pops() {
        let mut ns = Namespace::new();
        let frame = ns.enter("a");
        frame.exit();
        assert_eq!(ns.resolve("b"), "b");
    }

    #[test]
    fn early_return_pops_frame() {
        fn body(ns: &mut Namespace) -> Result<(), &'static str> {
            let mut frame = ns.enter("a");
            let _inner = frame.enter("b");
            Err::<(), _>("boom")?;
            Ok(())
        }

        let mut ns = Namespace::new();
        assert_eq!(body(&mut ns), Err("boom"));
        assert_eq!(ns.depth(), 0);
    }
}
