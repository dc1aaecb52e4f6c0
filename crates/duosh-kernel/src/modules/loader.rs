//! `use`: resolve, evaluate once, cache the namespace.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::compiler::{compile, StaticScope};
use crate::interpreter::{eval_chunk, ErrorCause, EvalResult, ExecContext, Frame, Namespace};

use super::source::{normalize_spec, ModuleError, ModuleSource};

impl From<ModuleError> for ErrorCause {
    fn from(e: ModuleError) -> Self {
        ErrorCause::Module(e.to_string())
    }
}

/// Namespaces of already evaluated modules, by resolved key. Each entry
/// initializes at most once, even when importers race.
#[derive(Default)]
pub struct ModuleCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<Namespace>>>>>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Arc<OnceCell<Arc<Namespace>>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// The namespace for `key`, if it finished loading.
    pub fn get(&self, key: &str) -> Option<Arc<Namespace>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .and_then(|cell| cell.get().cloned())
    }

    /// Keys of loaded modules, sorted.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Forget everything; the next `use` evaluates again.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

pub struct ModuleLoader {
    source: Arc<dyn ModuleSource>,
    cache: Arc<ModuleCache>,
    extension: String,
}

impl ModuleLoader {
    pub fn new(
        source: Arc<dyn ModuleSource>,
        cache: Arc<ModuleCache>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache,
            extension: extension.into(),
        }
    }

    pub fn cache(&self) -> &Arc<ModuleCache> {
        &self.cache
    }

    /// Namespace for `spec`, evaluating the module on first use.
    pub async fn load(&self, spec: &str, ctx: &ExecContext) -> EvalResult<Arc<Namespace>> {
        let rel = normalize_spec(spec, &self.extension).map_err(ErrorCause::from)?;
        let key = self.source.resolve(&rel).await.map_err(ErrorCause::from)?;

        if ctx.imports.iter().any(|k| *k == key) {
            let mut chain: Vec<&str> = ctx.imports.iter().map(String::as_str).collect();
            chain.push(&key);
            let message = format!("circular import: {}", chain.join(" -> "));
            return Err(ErrorCause::Module(message).into());
        }

        let ns = self
            .cache
            .entry(&key)
            .get_or_try_init(|| self.evaluate(spec, &key, ctx))
            .await?
            .clone();
        Ok(ns)
    }

    async fn evaluate(
        &self,
        spec: &str,
        key: &str,
        ctx: &ExecContext,
    ) -> EvalResult<Arc<Namespace>> {
        debug!(module = %key, "loading module");
        let chunk = self.source.fetch(key).await.map_err(ErrorCause::from)?;

        let mut scope = StaticScope::new();
        let op = compile(&chunk, &mut scope, &ctx.env.builtins, key)
            .map_err(|e| ErrorCause::Compilation(e.to_string()))?;

        let frame = Arc::new(Frame::new());
        let mut imports = ctx.imports.as_ref().clone();
        imports.push(key.to_string());
        let module_ctx = ExecContext {
            frame: frame.clone(),
            captures: Arc::new(HashMap::new()),
            imports: Arc::new(imports),
            ..ctx.clone()
        };

        if let Err(e) = eval_chunk(&op, &module_ctx).await {
            return match e.flow_kind() {
                Some(flow) => Err(ErrorCause::Module(format!(
                    "{key}: {flow} escaped the module body"
                ))
                .into()),
                None => Err(e),
            };
        }
        debug!(module = %key, members = frame.names().len(), "module loaded");
        Ok(Arc::new(Namespace::from_frame(spec, &frame)))
    }
}
