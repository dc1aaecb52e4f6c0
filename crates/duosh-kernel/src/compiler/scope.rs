//! Compile-time scope tracking and closure conversion.
//!
//! `StaticScope` mirrors the runtime frame stack while a chunk compiles.
//! Only lambdas push a frame; special-form bodies compile into the frame
//! they appear in.
//!
//! Resolving a name bound in an outer frame records it as a capture in
//! every lambda frame between the binding and the use. When each lambda is
//! instantiated at run time, it copies those cells out of its creator's
//! frame or captures. Two closures created by the same activation
//! therefore share cells, and no runtime chain walk is needed.

use std::collections::HashSet;

use super::ops::VarRef;

/// Where a lambda finds a captured cell when it is instantiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureSource {
    /// The creating activation's own frame.
    Local,
    /// The creating closure's captures.
    Captured,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub name: String,
    pub source: CaptureSource,
}

#[derive(Debug, Default)]
struct StaticFrame {
    locals: HashSet<String>,
    captures: Vec<Capture>,
}

impl StaticFrame {
    fn captures(&self, name: &str) -> bool {
        self.captures.iter().any(|c| c.name == name)
    }

    fn binds(&self, name: &str) -> bool {
        self.locals.contains(name) || self.captures(name)
    }
}

/// Stack of static frames. Index 0 is the outermost (global or module) frame.
#[derive(Debug)]
pub struct StaticScope {
    frames: Vec<StaticFrame>,
}

impl Default for StaticScope {
    fn default() -> Self {
        Self::new()
    }
}

impl StaticScope {
    /// A scope with one empty frame, as used for module bodies.
    pub fn new() -> Self {
        Self {
            frames: vec![StaticFrame::default()],
        }
    }

    /// A scope whose outermost frame already binds `names`.
    pub fn with_globals<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut scope = Self::new();
        scope.frames[0].locals = names.into_iter().map(Into::into).collect();
        scope
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Enter a lambda body.
    pub fn push(&mut self) {
        self.frames.push(StaticFrame::default());
    }

    /// Leave a lambda body, returning what it captured.
    pub fn pop(&mut self) -> Vec<Capture> {
        debug_assert!(self.frames.len() > 1, "cannot pop the outermost static frame");
        self.frames.pop().map(|f| f.captures).unwrap_or_default()
    }

    fn innermost(&mut self) -> &mut StaticFrame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Bind `name` in the innermost frame.
    pub fn declare(&mut self, name: &str) {
        self.innermost().locals.insert(name.to_string());
    }

    /// Remove a local binding. Returns false if it was not local.
    pub fn undeclare(&mut self, name: &str) -> bool {
        self.innermost().locals.remove(name)
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.frames
            .last()
            .is_some_and(|f| f.locals.contains(name))
    }

    /// Innermost-first lookup across every frame.
    pub fn resolve(&mut self, name: &str) -> Option<VarRef> {
        let top = self.frames.len() - 1;
        self.resolve_from(name, top)
    }

    /// Lookup that skips the innermost frame (`up:`).
    pub fn resolve_up(&mut self, name: &str) -> Option<VarRef> {
        let top = self.frames.len().checked_sub(2)?;
        self.resolve_from(name, top)
    }

    fn resolve_from(&mut self, name: &str, top: usize) -> Option<VarRef> {
        let innermost = self.frames.len() - 1;
        let found = (0..=top).rev().find(|&i| self.frames[i].binds(name))?;

        if found == innermost {
            return Some(if self.frames[found].locals.contains(name) {
                VarRef::Local(name.to_string())
            } else {
                VarRef::Captured(name.to_string())
            });
        }

        for j in found + 1..=innermost {
            if self.frames[j].captures(name) {
                continue;
            }
            let source = if j - 1 == found && self.frames[found].locals.contains(name) {
                CaptureSource::Local
            } else {
                CaptureSource::Captured
            };
            self.frames[j].captures.push(Capture {
                name: name.to_string(),
                source,
            });
        }
        Some(VarRef::Captured(name.to_string()))
    }

    /// Names bound in the outermost frame.
    pub fn global_names(&self) -> HashSet<String> {
        self.frames[0].locals.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_in_same_frame() {
        let mut scope = StaticScope::new();
        scope.declare("x");
        assert_eq!(scope.resolve("x"), Some(VarRef::Local("x".into())));
        assert_eq!(scope.resolve("y"), None);
    }

    #[test]
    fn outer_binding_is_captured_through_every_frame() {
        let mut scope = StaticScope::with_globals(["x"]);
        scope.push();
        scope.push();
        assert_eq!(scope.resolve("x"), Some(VarRef::Captured("x".into())));

        let inner = scope.pop();
        assert_eq!(
            inner,
            vec![Capture { name: "x".into(), source: CaptureSource::Captured }]
        );
        let middle = scope.pop();
        assert_eq!(
            middle,
            vec![Capture { name: "x".into(), source: CaptureSource::Local }]
        );
    }

    #[test]
    fn capture_is_recorded_once() {
        let mut scope = StaticScope::with_globals(["x"]);
        scope.push();
        scope.resolve("x");
        scope.resolve("x");
        assert_eq!(scope.pop().len(), 1);
    }

    #[test]
    fn up_skips_the_innermost_frame() {
        let mut scope = StaticScope::with_globals(["x"]);
        scope.push();
        scope.declare("x");
        assert_eq!(scope.resolve("x"), Some(VarRef::Local("x".into())));
        assert_eq!(scope.resolve_up("x"), Some(VarRef::Captured("x".into())));
        // The shadowing local and the capture coexist under one name.
        assert!(scope.is_local("x"));
        assert_eq!(scope.pop().len(), 1);
    }

    #[test]
    fn up_at_outermost_frame_fails() {
        let mut scope = StaticScope::with_globals(["x"]);
        assert_eq!(scope.resolve_up("x"), None);
    }

    #[test]
    fn declarations_stay_in_their_frame() {
        let mut scope = StaticScope::new();
        scope.push();
        scope.declare("fresh");
        scope.pop();
        assert_eq!(scope.resolve("fresh"), None);
        assert!(scope.global_names().is_empty());
    }
}
