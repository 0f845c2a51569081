//! Tool abstraction for LLM function-calling agents.
//!
//! The [`Tool`] trait defines the interface that every tool must implement:
//! a static API definition (name, description, JSON schema) and an async
//! `execute` method. Tools are collected into a [`ToolRegistry`] which
//! handles dispatch, definition export, argument validation, caching and
//! result truncation.

use crate::ToolDef;
use crate::error::ToolError;
use crate::tools::cache::{RequestCache, RequestDescription, build_cache_key, describe_request};
use crate::tools::progress::ToolContext;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Default timeout for tool execution when one is enabled.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send + 'a>>;

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that an LLM agent can invoke via function-calling.
///
/// Implementors provide:
/// - A static definition ([`Tool::definition`]) describing the tool's name,
///   description, and JSON Schema parameters for the LLM.
/// - An async [`Tool::execute`] method that receives the raw JSON arguments
///   string plus a [`ToolContext`], and returns the result text or a
///   [`ToolError`].
///
/// # Example
///
/// ```ignore
/// struct FilingsTool { client: SecClient }
///
/// impl Tool for FilingsTool {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute<'a>(&'a self, arguments: &'a str, ctx: &'a ToolContext) -> ToolFuture<'a> {
///         Box::pin(async move {
///             let args: FilingsArgs = parse_tool_args("get_filings", arguments)?;
///             ctx.emit_progress(format!("Fetching filings for {}", args.ticker));
///             self.client.filings(&args.ticker).await.map_err(ToolError::execution)
///         })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the LLM API.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    ///
    /// Executors may call [`ToolContext::emit_progress`] any number of
    /// times before returning, and should stop early once the context's
    /// cancellation token fires. Failures are returned as [`ToolError`]; the
    /// orchestrator reports them to the model and keeps going.
    ///
    /// Uses a boxed future so that the trait is dyn-compatible (object-safe).
    fn execute<'a>(&'a self, arguments: &'a str, ctx: &'a ToolContext) -> ToolFuture<'a>;

    /// The tool's name (convenience: delegates to definition).
    fn name(&self) -> String {
        self.definition().function.name
    }

    /// Whether this tool's results can be served from the request cache
    /// (read-only and deterministic for the same arguments). Defaults to
    /// `false`.
    fn cacheable(&self) -> bool {
        false
    }
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// A collection of tools that can be dispatched by name.
///
/// # Example
///
/// ```ignore
/// let tools = ToolRegistry::new()
///     .with_max_result_bytes(15_000)
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)))
///     .with_cache(Arc::new(RequestCache::persistent(".dexter/cache")?))
///     .with(PriceTool::new(client.clone()))
///     .with_if(news_enabled, NewsTool::new(client));
///
/// let defs = tools.definitions();
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// Timeout applied to every execution. `None` disables timeouts.
    default_timeout: Option<Duration>,
    /// Cache consulted for tools whose `cacheable()` is true.
    cache: Option<Arc<RequestCache>>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("max_result_bytes", &self.max_result_bytes)
            .field("validate_args", &self.validate_args)
            .field("default_timeout", &self.default_timeout)
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
            cache: None,
        }
    }

    /// Set the maximum result size in bytes before truncation.
    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    /// Enable JSON Schema argument validation before tool execution.
    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    /// Set a timeout for tool execution. Pass `None` to disable timeouts.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Serve cacheable tools through `cache`.
    pub fn with_cache(mut self, cache: Arc<RequestCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name();
        if self.tools.insert(name.clone(), Box::new(tool)).is_some() {
            debug!("[tool] replaced existing registration for {name}");
        }
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    /// All tool definitions for the LLM API, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDef> {
        let mut defs: Vec<ToolDef> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Whether a tool's results are served from the cache.
    pub fn is_cacheable(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|t| t.cacheable())
    }

    /// The attached request cache, if any.
    pub fn cache(&self) -> Option<&Arc<RequestCache>> {
        self.cache.as_ref()
    }

    /// Render every tool's name and description as prompt text.
    pub fn build_tool_descriptions(&self) -> String {
        self.definitions()
            .iter()
            .map(|d| format!("### {}\n\n{}", d.function.name, d.function.description.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Execute a tool call by name.
    ///
    /// An unknown name fails with [`ToolError::UnknownTool`] without running
    /// anything. Otherwise arguments are validated (if enabled), the cache is
    /// consulted for cacheable tools, and the executor runs under the
    /// configured timeout. Successful results are truncated to
    /// `max_result_bytes`. Failed calls are never retried here.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: &str,
        ctx: &ToolContext,
    ) -> Result<String, ToolError> {
        let Some(tool) = self.tools.get(name) else {
            warn!("[tool] unknown tool requested: {name}");
            return Err(ToolError::UnknownTool(name.to_string()));
        };

        if self.validate_args {
            validate_tool_arguments(tool.as_ref(), arguments)?;
        }

        let cache_key = match &self.cache {
            Some(cache) if tool.cacheable() => cacheable_request(name, arguments)
                .map(|desc| (cache, describe_request(&desc), build_cache_key(&desc))),
            _ => None,
        };

        if let Some((cache, label, key)) = &cache_key
            && let Some(hit) = cache.read_cache::<String>(key)
        {
            info!("[tool] {label} served from cache ({} bytes)", hit.len());
            return Ok(hit);
        }

        log_tool_call(name, arguments);
        let start = Instant::now();

        let outcome = match self.default_timeout {
            Some(limit) => match tokio::time::timeout(limit, tool.execute(arguments, ctx)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    Err(ToolError::Timeout {
                        tool: name.to_string(),
                        limit,
                    })
                }
            },
            None => tool.execute(arguments, ctx).await,
        };

        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                debug!("Tool {name} failed in {elapsed_ms:.0}ms: {e}");
                return Err(e);
            }
        };

        debug!("Tool {name} completed in {elapsed_ms:.0}ms ({} bytes)", result.len());
        trace!("Tool {name} result preview: {}", preview_chars(&result, 300));

        let result = truncate_result(result, self.max_result_bytes);
        if let Some((cache, label, key)) = &cache_key
            && let Err(e) = cache.write_cache(key, &result)
        {
            warn!("[tool] failed to cache {label}: {e}");
        }
        Ok(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn cacheable_request(name: &str, arguments: &str) -> Option<RequestDescription> {
    let args = if arguments.trim().is_empty() {
        serde_json::Value::Object(Default::default())
    } else {
        serde_json::from_str(arguments).ok()?
    };
    Some(RequestDescription::tool(name, args))
}

// ── FnTool ────────────────────────────────────────────────────────

/// Type-erased async handler for [`FnTool`].
type ErasedToolHandler = Box<
    dyn Fn(String, ToolContext) -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// A closure-based tool that auto-parses arguments and delegates to a handler.
///
/// Use [`FnTool`] for stateless tools. For tools that need shared state
/// (API clients, configuration), define a struct and implement [`Tool`]
/// directly.
///
/// # Example
///
/// ```ignore
/// #[derive(Deserialize, JsonSchema)]
/// struct PriceArgs {
///     /// Stock ticker, e.g. "AAPL".
///     ticker: String,
/// }
///
/// let tool = FnTool::new(
///     ToolDef::new("get_price", "Latest price for a ticker", json_schema_for::<PriceArgs>()),
///     |args: PriceArgs, ctx: ToolContext| async move {
///         ctx.emit_progress(format!("Looking up {}", args.ticker));
///         Ok(format!("{}: 187.25", args.ticker))
///     },
/// )
/// .cacheable(true);
/// ```
pub struct FnTool {
    def: ToolDef,
    handler: ErasedToolHandler,
    cacheable: bool,
}

impl FnTool {
    /// Create a new closure-based tool.
    ///
    /// The handler receives arguments of type `A` (deserialized from the raw
    /// JSON string) and a clone of the call's [`ToolContext`]. Parse errors
    /// become [`ToolError::InvalidArguments`] without calling the handler.
    pub fn new<A, F, Fut>(def: ToolDef, handler: F) -> Self
    where
        A: serde::de::DeserializeOwned + Send + 'static,
        F: Fn(A, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, ToolError>> + Send + 'static,
    {
        let name = def.function.name.clone();
        let erased = move |raw: String,
                           ctx: ToolContext|
              -> Pin<Box<dyn Future<Output = Result<String, ToolError>> + Send>> {
            match parse_tool_args::<A>(&name, &raw) {
                Ok(args) => Box::pin(handler(args, ctx)),
                Err(e) => Box::pin(async move { Err(e) }),
            }
        };

        Self {
            def,
            handler: Box::new(erased),
            cacheable: false,
        }
    }

    /// Mark this tool's results as cacheable (builder pattern).
    pub fn cacheable(mut self, cacheable: bool) -> Self {
        self.cacheable = cacheable;
        self
    }
}

impl Tool for FnTool {
    fn definition(&self) -> ToolDef {
        self.def.clone()
    }

    fn execute<'a>(&'a self, arguments: &'a str, ctx: &'a ToolContext) -> ToolFuture<'a> {
        (self.handler)(arguments.to_string(), ctx.clone())
    }

    fn cacheable(&self) -> bool {
        self.cacheable
    }
}

impl fmt::Debug for FnTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.def.function.name)
            .field("cacheable", &self.cacheable)
            .finish()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// The error message lists every violation so the model can self-correct.
/// A schema that fails to compile skips validation.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Result<(), ToolError> {
    let name = tool.name();
    let args_value: serde_json::Value =
        serde_json::from_str(arguments).map_err(|e| ToolError::InvalidArguments {
            tool: name.clone(),
            message: format!("arguments are not valid JSON: {e}"),
        })?;

    let schema = tool.definition().function.parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return Ok(());
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("{}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ToolError::InvalidArguments {
            tool: name,
            message: errors.join("; "),
        })
    }
}

/// Parse raw JSON arguments into a typed struct.
pub fn parse_tool_args<T: serde::de::DeserializeOwned>(
    tool: &str,
    arguments: &str,
) -> Result<T, ToolError> {
    let raw = if arguments.trim().is_empty() { "{}" } else { arguments };
    serde_json::from_str(raw).map_err(|e| ToolError::InvalidArguments {
        tool: tool.to_string(),
        message: e.to_string(),
    })
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview = preview_chars(arguments, 120);
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if args_preview.len() < arguments.len() { "..." } else { "" }
    );
    debug!("[tool] {name} full args ({} bytes)", arguments.len());
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (backing off to a char
/// boundary), appending a notice if trimmed.
pub fn truncate_result(mut s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let total = s.len();
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
    format!("{s}...\n[truncated: {total} bytes total]")
}

/// First `max_chars` characters of `s`, for log previews.
pub fn preview_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

// ── Tests ──────────────────────────────────────────────────────────
