//! Correlation logging
//!
//! Best-effort archival of request and response artifacts. Each logical call
//! gets its own [`LogContext`] with a process-wide monotonic id; every artifact
//! logged through it gets a monotonic sequence id. Artifacts are named
//! `{context_id}_{sequence_id}_{flattened_type_name}`.
//!
//! Logging never affects the call being logged: write failures are reported
//! through `tracing` and an optional failure hook, then dropped.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_CONTEXT_ID: AtomicI64 = AtomicI64::new(1);

/// Explicit type-name capability used to name logged artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeTag {
    pub name: String,
    pub args: Vec<TypeTag>,
}

impl TypeTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: TypeTag) -> Self {
        self.args.push(arg);
        self
    }

    /// Derive a tag from the compile-time name of `T`, dropping module paths.
    ///
    /// `Vec<my_crate::dto::ChatChunk>` becomes `Vec` with argument `ChatChunk`.
    pub fn of<T: ?Sized>() -> Self {
        Self::parse(std::any::type_name::<T>())
    }

    /// Parse a Rust type name such as `a::B<c::D, E<F>>`.
    pub fn parse(type_name: &str) -> Self {
        let mut chars = type_name.trim().chars().peekable();
        parse_tag(&mut chars)
    }

    /// Join the name with each argument (recursively) using `_`.
    pub fn flatten(&self) -> String {
        let mut out = self.name.clone();
        for arg in &self.args {
            out.push('_');
            out.push_str(&arg.flatten());
        }
        out
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.flatten())
    }
}

fn skip_spaces(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    while chars.peek() == Some(&' ') {
        chars.next();
    }
}

/// Comma separated tags up to and including `close`.
fn parse_list(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, close: char) -> Vec<TypeTag> {
    let mut items = Vec::new();
    loop {
        skip_spaces(chars);
        if chars.peek() == Some(&close) {
            chars.next();
            break;
        }
        items.push(parse_tag(chars));
        skip_spaces(chars);
        match chars.next() {
            Some(',') => continue,
            _ => break,
        }
    }
    items
}

// Tuples become `Tuple` (or `Unit`), `[T]` becomes `Slice` and `[T; N]` `Array`.
fn parse_tag(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> TypeTag {
    skip_spaces(chars);
    while chars.peek() == Some(&'&') {
        chars.next();
    }
    match chars.peek() {
        Some('(') => {
            chars.next();
            let args = parse_list(chars, ')');
            let name = if args.is_empty() { "Unit" } else { "Tuple" };
            return TypeTag {
                name: name.to_string(),
                args,
            };
        }
        Some('[') => {
            chars.next();
            let element = parse_tag(chars);
            let mut name = "Slice";
            for c in chars.by_ref() {
                match c {
                    ';' => name = "Array",
                    ']' => break,
                    _ => {}
                }
            }
            return TypeTag {
                name: name.to_string(),
                args: vec![element],
            };
        }
        _ => {}
    }

    let mut path = String::new();
    let mut args = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            '<' => {
                chars.next();
                args = parse_list(chars, '>');
            }
            ',' | '>' | ')' | ']' | ';' => break,
            _ => {
                path.push(c);
                chars.next();
            }
        }
    }
    let last = path.rsplit("::").next().unwrap_or(&path);
    let name: String = last
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .trim_matches('_')
        .to_string();
    TypeTag { name, args }
}

/// Destination for rendered artifacts.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    async fn write_artifact(&self, name: &str, contents: &str) -> std::io::Result<()>;
}

/// Side channel notified when an artifact cannot be written.
pub type LogFailureHook = Arc<dyn Fn(&str, &std::io::Error) + Send + Sync>;

/// Per-call logging context.
pub struct LogContext {
    context_id: i64,
    next_sequence: AtomicI64,
    sink: Arc<dyn ArtifactSink>,
    on_failure: Option<LogFailureHook>,
}

impl LogContext {
    fn new(sink: Arc<dyn ArtifactSink>, on_failure: Option<LogFailureHook>) -> Self {
        Self {
            context_id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            next_sequence: AtomicI64::new(0),
            sink,
            on_failure,
        }
    }

    pub fn context_id(&self) -> i64 {
        self.context_id
    }

    /// Write one artifact. Failures are reported, never returned.
    pub async fn log(&self, tag: &TypeTag, payload: &(dyn fmt::Display + Sync)) {
        let sequence_id = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}_{}_{}", self.context_id, sequence_id, tag.flatten());
        let contents = payload.to_string();
        if let Err(e) = self.sink.write_artifact(&name, &contents).await {
            tracing::warn!(
                target: "siumai_transport::correlation",
                artifact = %name,
                error = %e,
                "failed to write correlation artifact"
            );
            if let Some(hook) = &self.on_failure {
                hook(&name, &e);
            }
        }
    }
}

impl fmt::Debug for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogContext")
            .field("context_id", &self.context_id)
            .field("next_sequence", &self.next_sequence.load(Ordering::Relaxed))
            .finish()
    }
}

/// Log an artifact if a context is present.
pub async fn log_optional(
    ctx: Option<&LogContext>,
    tag: &TypeTag,
    payload: &(dyn fmt::Display + Sync),
) {
    if let Some(ctx) = ctx {
        ctx.log(tag, payload).await;
    }
}

/// Factory for per-call log contexts.
pub trait CorrelationLogger: Send + Sync {
    /// `None` when logging is disabled.
    fn create(&self) -> Option<LogContext>;
}

/// Logger that never creates contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledCorrelationLogger;

impl CorrelationLogger for DisabledCorrelationLogger {
    fn create(&self) -> Option<LogContext> {
        None
    }
}

/// Writes each artifact to `{dir}/{name}.json`.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactSink for DirectorySink {
    async fn write_artifact(&self, name: &str, contents: &str) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(format!("{name}.json")), contents).await
    }
}

/// Logger writing artifacts to a directory.
#[derive(Clone)]
pub struct FileCorrelationLogger {
    sink: Arc<dyn ArtifactSink>,
    on_failure: Option<LogFailureHook>,
}

impl FileCorrelationLogger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_sink(Arc::new(DirectorySink::new(dir)))
    }

    pub fn with_sink(sink: Arc<dyn ArtifactSink>) -> Self {
        Self {
            sink,
            on_failure: None,
        }
    }

    /// Register a side channel for write failures.
    pub fn on_failure(mut self, hook: LogFailureHook) -> Self {
        self.on_failure = Some(hook);
        self
    }
}

impl fmt::Debug for FileCorrelationLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCorrelationLogger").finish_non_exhaustive()
    }
}

impl CorrelationLogger for FileCorrelationLogger {
    fn create(&self) -> Option<LogContext> {
        Some(LogContext::new(self.sink.clone(), self.on_failure.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tracing_test::traced_test;

    mod dto {
        pub struct ChatChunk;
    }

    #[test]
    fn flattens_nested_generics() {
        let tag = TypeTag::new("Page").with_arg(TypeTag::new("Vec").with_arg(TypeTag::new("File")));
        assert_eq!(tag.flatten(), "Page_Vec_File");
    }

    #[test]
    fn derives_tag_from_type_name() {
        assert_eq!(TypeTag::of::<Vec<dto::ChatChunk>>().flatten(), "Vec_ChatChunk");
        assert_eq!(
            TypeTag::of::<std::collections::HashMap<String, Vec<u8>>>().flatten(),
            "HashMap_String_Vec_u8"
        );
        assert_eq!(TypeTag::of::<serde_json::Value>().flatten(), "Value");
    }

    #[test]
    fn tuples_and_slices_keep_every_element() {
        assert_eq!(TypeTag::of::<(u8, String)>().flatten(), "Tuple_u8_String");
        assert_eq!(
            TypeTag::of::<Vec<(dto::ChatChunk, Option<u32>)>>().flatten(),
            "Vec_Tuple_ChatChunk_Option_u32"
        );
        assert_eq!(TypeTag::of::<[u8; 4]>().flatten(), "Array_u8");
        assert_eq!(TypeTag::of::<&[dto::ChatChunk]>().flatten(), "Slice_ChatChunk");
        assert_eq!(TypeTag::of::<()>().flatten(), "Unit");
        assert_eq!(TypeTag::of::<&str>().flatten(), "str");
    }

    #[tokio::test]
    async fn writes_sequenced_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let logger = FileCorrelationLogger::new(dir.path());
        let ctx = logger.create().expect("enabled");
        let tag = TypeTag::of::<dto::ChatChunk>();
        ctx.log(&tag, &"first").await;
        ctx.log(&tag, &"second").await;

        let id = ctx.context_id();
        let first = dir.path().join(format!("{id}_0_ChatChunk.json"));
        let second = dir.path().join(format!("{id}_1_ChatChunk.json"));
        assert_eq!(std::fs::read_to_string(first).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(second).unwrap(), "second");
    }

    #[test]
    fn context_ids_are_unique_and_increasing() {
        let logger = FileCorrelationLogger::new(std::env::temp_dir());
        let a = logger.create().unwrap().context_id();
        let b = logger.create().unwrap().context_id();
        assert!(b > a);
    }

    #[test]
    fn disabled_logger_creates_nothing() {
        assert!(DisabledCorrelationLogger.create().is_none());
    }

    struct FailingSink;

    #[async_trait]
    impl ArtifactSink for FailingSink {
        async fn write_artifact(&self, _name: &str, _contents: &str) -> std::io::Result<()> {
            Err(std::io::Error::other("disk full"))
        }
    }

    #[traced_test]
    #[tokio::test]
    async fn write_failures_are_reported_not_raised() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_hook = seen.clone();
        let logger = FileCorrelationLogger::with_sink(Arc::new(FailingSink)).on_failure(Arc::new(
            move |name: &str, _e: &std::io::Error| seen_hook.lock().unwrap().push(name.to_string()),
        ));
        let ctx = logger.create().unwrap();
        ctx.log(&TypeTag::new("Req"), &"payload").await;

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert!(logs_contain("failed to write correlation artifact"));
    }
}
