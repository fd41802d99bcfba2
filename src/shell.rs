//! Interactive terminal menu.
//!
//! Reads one line at a time from a [`LineSource`] and writes prompts and
//! results to `output`, so the same loop runs against the real terminal or an
//! in-memory script. End of input at any prompt leaves the shell cleanly.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::mpsc;

use crate::agent_core::tool_result::{render_call_error, render_call_result};
use crate::agent_core::{AgentError, Orchestrator, QuestionOutcome};
use crate::inference::CompletionClient;
use crate::mcp_client::{Catalog, McpClient, McpError};

const MENU: &str = "\nWhat would you like to do?\n  1) Run a tool\n  2) Read a resource\n  3) Ask the AI\n  4) Quit\n";

/// Menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    RunTool,
    ReadResource,
    Ask,
    Quit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "1" | "tool" | "run" => Some(Self::RunTool),
            "2" | "resource" | "read" => Some(Self::ReadResource),
            "3" | "ask" | "ai" => Some(Self::Ask),
            "4" | "quit" | "exit" | "q" => Some(Self::Quit),
            _ => None,
        }
    }
}

// ─── Input ───────────────────────────────────────────────────────────────────

/// Where the shell's input lines come from.
#[async_trait]
pub trait LineSource: Send {
    /// Next line without its terminator. `None` at end of input.
    async fn next_line(&mut self) -> std::io::Result<Option<String>>;
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineSource for Lines<R> {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        Lines::next_line(self).await
    }
}

/// Lines read by a dedicated OS thread.
///
/// A blocking read parked on a runtime worker keeps the runtime from
/// shutting down; this thread is detached instead, so an interrupted
/// process exits without waiting for the user to press Enter.
pub struct ThreadedLines {
    rx: mpsc::Receiver<std::io::Result<String>>,
}

impl ThreadedLines {
    pub fn spawn<R: std::io::BufRead + Send + 'static>(reader: R) -> Self {
        let (tx, rx) = mpsc::channel(1);
        std::thread::spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        });
        Self { rx }
    }

    /// Read the process's standard input.
    pub fn stdin() -> Self {
        Self::spawn(std::io::BufReader::new(std::io::stdin()))
    }
}

#[async_trait]
impl LineSource for ThreadedLines {
    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        self.rx.recv().await.transpose()
    }
}

/// Run `work` unless `interrupt` completes first. `None` means interrupted;
/// `work` is dropped at that point.
pub async fn unless_interrupted<T>(
    work: impl Future<Output = T>,
    interrupt: impl Future,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = interrupt => None,
        out = work => Some(out),
    }
}

// ─── Shell ───────────────────────────────────────────────────────────────────

/// Whether the shell keeps going after an action.
enum Flow {
    Continue,
    Exit,
}

pub struct Shell<C, L, W> {
    catalog: Catalog,
    tools: Arc<McpClient>,
    agent: Orchestrator<C>,
    input: L,
    output: W,
}

impl<C, L, W> Shell<C, L, W>
where
    C: CompletionClient,
    L: LineSource,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        catalog: Catalog,
        tools: Arc<McpClient>,
        agent: Orchestrator<C>,
        input: L,
        output: W,
    ) -> Self {
        Self {
            catalog,
            tools,
            agent,
            input,
            output,
        }
    }

    /// Give back the output sink.
    pub fn into_output(self) -> W {
        self.output
    }

    /// Run until the user quits or input ends.
    ///
    /// Errors only when the terminal or the tool host is gone; everything
    /// else is printed and the menu comes back.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let banner = format!(
            "Connected to {} ({} tools, {} resources)",
            self.catalog.server_label(),
            self.catalog.tools.len(),
            self.catalog.resources.len()
        );
        self.say(&banner).await?;

        loop {
            self.write(MENU).await?;
            let Some(line) = self.prompt("> ").await? else {
                break;
            };
            let flow = match MenuChoice::parse(&line) {
                Some(MenuChoice::RunTool) => self.run_tool().await?,
                Some(MenuChoice::ReadResource) => self.read_resource().await?,
                Some(MenuChoice::Ask) => self.ask().await?,
                Some(MenuChoice::Quit) => Flow::Exit,
                None => {
                    self.say("Please pick 1, 2, 3 or 4.").await?;
                    Flow::Continue
                }
            };
            if let Flow::Exit = flow {
                break;
            }
        }

        tracing::info!("shell finished");
        Ok(())
    }

    async fn run_tool(&mut self) -> anyhow::Result<Flow> {
        if self.catalog.tools.is_empty() {
            self.say("The server exposes no tools.").await?;
            return Ok(Flow::Continue);
        }

        let listing = numbered(self.catalog.tools.iter().map(|t| {
            if t.description.is_empty() {
                t.name.clone()
            } else {
                format!("{}: {}", t.name, t.description)
            }
        }));
        self.say(&listing).await?;

        let Some(pick) = self.prompt("Tool: ").await? else {
            return Ok(Flow::Exit);
        };
        let Some(tool) = pick_entry(&self.catalog.tools, &pick, |t| &t.name).cloned() else {
            self.say(&format!("No tool matches '{}'.", pick.trim())).await?;
            return Ok(Flow::Continue);
        };

        let mut answers = Vec::new();
        for (name, ty) in tool.parameters() {
            let Some(raw) = self.prompt(&format!("{name} ({ty}): ")).await? else {
                return Ok(Flow::Exit);
            };
            answers.push((name, ty, raw));
        }
        let arguments = build_arguments(&answers);

        tracing::info!(tool = %tool.name, %arguments, "running tool from shell");
        let text = match self.tools.call_tool(&tool.name, arguments).await {
            Ok(result) => render_call_result(&tool.name, &result),
            Err(e) => tool_host_failure(&tool.name, e)?,
        };
        self.say(&text).await?;
        Ok(Flow::Continue)
    }

    async fn read_resource(&mut self) -> anyhow::Result<Flow> {
        if self.catalog.resources.is_empty() {
            self.say("The server exposes no resources.").await?;
            return Ok(Flow::Continue);
        }

        let listing = numbered(
            self.catalog
                .resources
                .iter()
                .map(|r| format!("{} ({})", r.name, r.uri)),
        );
        self.say(&listing).await?;

        let Some(pick) = self.prompt("Resource: ").await? else {
            return Ok(Flow::Exit);
        };
        let uri = match pick_entry(&self.catalog.resources, &pick, |r| &r.name) {
            Some(resource) => resource.uri.clone(),
            None => pick.trim().to_string(),
        };

        let text = match self.tools.read_resource(&uri).await {
            Ok(text) if text.is_empty() => "(empty resource)".to_string(),
            Ok(text) => text,
            Err(e) if is_recoverable(&e) => format!("Could not read {uri}: {e}"),
            Err(e) => return Err(e).context("tool host unavailable"),
        };
        self.say(&text).await?;
        Ok(Flow::Continue)
    }

    async fn ask(&mut self) -> anyhow::Result<Flow> {
        let Some(question) = self.prompt("Question: ").await? else {
            return Ok(Flow::Exit);
        };
        if question.trim().is_empty() {
            return Ok(Flow::Continue);
        }

        let reply = match self.agent.ask(question.trim()).await {
            Ok(report) => match report.outcome {
                QuestionOutcome::Answer(text) | QuestionOutcome::ForcedAnswer(text) => text,
                QuestionOutcome::Unresolved(_) => {
                    "The model kept requesting tools and gave no final answer.".to_string()
                }
            },
            Err(AgentError::ToolHost(e)) => return Err(e).context("tool host unavailable"),
            Err(e @ AgentError::Completion(_)) => format!("Error: {e}"),
        };
        self.say(&reply).await?;
        Ok(Flow::Continue)
    }

    /// Show `label` and read one line. `None` at end of input.
    async fn prompt(&mut self, label: &str) -> anyhow::Result<Option<String>> {
        self.write(label).await?;
        let line = self
            .input
            .next_line()
            .await
            .context("failed to read input")?;
        Ok(line)
    }

    async fn say(&mut self, text: &str) -> anyhow::Result<()> {
        self.write(text).await?;
        self.write("\n").await
    }

    async fn write(&mut self, text: &str) -> anyhow::Result<()> {
        self.output
            .write_all(text.as_bytes())
            .await
            .context("failed to write output")?;
        self.output.flush().await.context("failed to write output")?;
        Ok(())
    }
}

/// Non-fatal failures become text; a dead tool host ends the shell.
fn tool_host_failure(tool_name: &str, err: McpError) -> anyhow::Result<String> {
    if is_recoverable(&err) {
        Ok(render_call_error(tool_name, &err))
    } else {
        Err(err).context("tool host unavailable")
    }
}

fn is_recoverable(err: &McpError) -> bool {
    matches!(
        err,
        McpError::Remote { .. } | McpError::Timeout { .. } | McpError::ProtocolError { .. }
    )
}

fn numbered(items: impl Iterator<Item = String>) -> String {
    items
        .enumerate()
        .map(|(i, item)| format!("  {}) {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Select by 1-based index or exact name.
fn pick_entry<'a, T>(items: &'a [T], input: &str, name: impl Fn(&T) -> &String) -> Option<&'a T> {
    let input = input.trim();
    if let Ok(n) = input.parse::<usize>() {
        return n.checked_sub(1).and_then(|i| items.get(i));
    }
    items.iter().find(|item| name(item) == input)
}

// ─── Argument coercion ───────────────────────────────────────────────────────

/// Convert one typed answer into JSON.
///
/// Values that do not parse as the declared type are sent as strings and
/// left for the tool host to reject.
pub fn coerce_argument(ty: &str, raw: &str) -> Value {
    let raw = raw.trim();
    match ty {
        "integer" => raw
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        "number" => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        "boolean" => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Value::Bool(true),
            "false" | "no" | "n" | "0" => Value::Bool(false),
            _ => Value::String(raw.to_string()),
        },
        "object" | "array" => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
        _ => Value::String(raw.to_string()),
    }
}

/// Build a `tools/call` arguments object from `(name, type, raw)` answers.
/// Blank answers are omitted.
pub fn build_arguments(answers: &[(String, String, String)]) -> Value {
    let map = answers
        .iter()
        .filter(|(_, _, raw)| !raw.trim().is_empty())
        .map(|(name, ty, raw)| (name.clone(), coerce_argument(ty, raw)))
        .collect::<serde_json::Map<_, _>>();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::AgentSettings;
    use crate::inference::types::{ChatMessage, CompletionResult, ToolDefinition};
    use crate::inference::InferenceError;
    use crate::mcp_client::types::{ServerCapabilities, ServerInfo};
    use crate::mcp_client::{McpResource, McpToolDefinition};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncBufReadExt, BufReader};

    struct FixedAnswer(&'static str);

    #[async_trait]
    impl CompletionClient for FixedAnswer {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
        ) -> Result<CompletionResult, InferenceError> {
            Ok(CompletionResult::Text(self.0.to_string()))
        }
    }

    /// Tool host answering `tools/call` with its arguments and
    /// `resources/read` with a fixed menu.
    fn echo_host() -> Arc<McpClient> {
        let (client_out, server_in) = tokio::io::duplex(16 * 1024);
        let (mut server_out, client_in) = tokio::io::duplex(16 * 1024);
        tokio::spawn(async move {
            let mut lines = BufReader::new(server_in).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let req: Value = serde_json::from_str(&line).unwrap();
                let result = match req["method"].as_str().unwrap() {
                    "tools/call" => json!({"content": [{
                        "type": "text",
                        "text": req["params"]["arguments"].to_string()
                    }]}),
                    "resources/read" => json!({"contents": [{
                        "uri": req["params"]["uri"], "text": "Latte 4.5\nMocha 5"
                    }]}),
                    _ => json!({}),
                };
                let mut out =
                    json!({"jsonrpc": "2.0", "id": req["id"], "result": result}).to_string();
                out.push('\n');
                server_out.write_all(out.as_bytes()).await.unwrap();
            }
        });
        Arc::new(McpClient::new(client_in, client_out))
    }

    fn catalog() -> Catalog {
        Catalog {
            protocol_version: None,
            server_info: ServerInfo {
                name: Some("coffee".into()),
                version: Some("1.0.0".into()),
            },
            capabilities: ServerCapabilities::default(),
            tools: vec![McpToolDefinition {
                name: "getDrinkInfo".into(),
                description: "Describe one drink".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string"},
                        "size": {"type": "integer"}
                    }
                }),
            }],
            resources: vec![McpResource {
                uri: "menu://drinks".into(),
                name: "menu".into(),
            }],
        }
    }

    async fn run_script(script: &str) -> String {
        let tools = echo_host();
        let catalog = catalog();
        let agent = Orchestrator::new(
            FixedAnswer("We offer Latte and Mocha."),
            tools.clone(),
            &catalog,
            AgentSettings::default(),
        );
        let mut shell = Shell::new(catalog, tools, agent, script.as_bytes().lines(), Vec::new());
        shell.run().await.unwrap();
        String::from_utf8(shell.into_output()).unwrap()
    }

    #[test]
    fn test_menu_choice_parse() {
        assert_eq!(MenuChoice::parse(" 1 "), Some(MenuChoice::RunTool));
        assert_eq!(MenuChoice::parse("Ask"), Some(MenuChoice::Ask));
        assert_eq!(MenuChoice::parse("q"), Some(MenuChoice::Quit));
        assert_eq!(MenuChoice::parse("7"), None);
    }

    #[test]
    fn test_coerce_argument_by_type() {
        assert_eq!(coerce_argument("integer", "12"), json!(12));
        assert_eq!(coerce_argument("integer", "twelve"), json!("twelve"));
        assert_eq!(coerce_argument("number", "4.5"), json!(4.5));
        assert_eq!(coerce_argument("boolean", "yes"), json!(true));
        assert_eq!(coerce_argument("boolean", "False"), json!(false));
        assert_eq!(coerce_argument("array", "[1, 2]"), json!([1, 2]));
        assert_eq!(coerce_argument("object", "{bad"), json!("{bad"));
        assert_eq!(coerce_argument("string", " Latte "), json!("Latte"));
    }

    #[test]
    fn test_build_arguments_skips_blank_answers() {
        let answers = vec![
            ("name".to_string(), "string".to_string(), "Latte".to_string()),
            ("size".to_string(), "integer".to_string(), "  ".to_string()),
        ];
        assert_eq!(build_arguments(&answers), json!({"name": "Latte"}));
        assert_eq!(build_arguments(&[]), json!({}));
    }

    #[test]
    fn test_pick_entry_by_index_or_name() {
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(pick_entry(&items, "2", |s| s), Some(&"b".to_string()));
        assert_eq!(pick_entry(&items, "a", |s| s), Some(&"a".to_string()));
        assert_eq!(pick_entry(&items, "0", |s| s), None);
        assert_eq!(pick_entry(&items, "3", |s| s), None);
    }

    #[tokio::test]
    async fn test_end_of_input_exits_cleanly() {
        let out = run_script("").await;
        assert!(out.contains("Connected to coffee 1.0.0 (1 tools, 1 resources)"));
        assert!(out.contains("4) Quit"));
    }

    #[tokio::test]
    async fn test_run_tool_prompts_and_coerces_arguments() {
        let out = run_script("1\ngetDrinkInfo\nLatte\n2\n4\n").await;
        assert!(out.contains("name (string): "));
        assert!(out.contains("size (integer): "));
        assert!(out.contains("name: Latte"));
        assert!(out.contains("size: 2"));
    }

    #[tokio::test]
    async fn test_read_resource_by_index() {
        let out = run_script("2\n1\nq\n").await;
        assert!(out.contains("menu (menu://drinks)"));
        assert!(out.contains("Latte 4.5\nMocha 5"));
    }

    #[tokio::test]
    async fn test_ask_prints_answer() {
        let out = run_script("3\nWhat kinds of drinks do you have?\n4\n").await;
        assert!(out.contains("We offer Latte and Mocha."));
    }

    #[tokio::test]
    async fn test_unknown_choice_reprompts() {
        let out = run_script("9\n4\n").await;
        assert!(out.contains("Please pick 1, 2, 3 or 4."));
    }

    #[tokio::test]
    async fn test_threaded_lines_deliver_then_end() {
        let mut input = ThreadedLines::spawn(std::io::Cursor::new("1\r\nLatte\n"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("1"));
        assert_eq!(input.next_line().await.unwrap().as_deref(), Some("Latte"));
        assert_eq!(input.next_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unless_interrupted() {
        assert_eq!(
            unless_interrupted(async { 7 }, std::future::pending::<()>()).await,
            Some(7)
        );
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tx.send(()).unwrap();
        assert_eq!(
            unless_interrupted(std::future::pending::<u32>(), rx).await,
            None
        );
    }

    /// A reader with no input yet, like an idle terminal.
    struct IdleTerminal;

    impl std::io::Read for IdleTerminal {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            loop {
                std::thread::park();
            }
        }
    }

    #[test]
    fn test_interrupt_at_prompt_does_not_wait_for_input() {
        let started = Instant::now();
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let outcome = runtime.block_on(async {
            let mut input = ThreadedLines::spawn(std::io::BufReader::new(IdleTerminal));
            unless_interrupted(
                input.next_line(),
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await
        });
        drop(runtime);

        assert!(outcome.is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
