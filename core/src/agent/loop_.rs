use crate::agent::response::{AbortReason, Response, RunStatus};
use crate::agent::{Agent, ToolChoice};
use crate::context::ContextVariables;
use crate::error::Error;
use crate::registry::Registry;
use crate::traits::{ChatMessage, ChatRequest, Provider, ToolCall, ToolCallResult};
use futures_util::FutureExt;
use futures_util::future::join_all;
use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

const DEFAULT_MAX_TURNS: usize = 30;

/// Tools whose successful execution ends the run.
pub const DEFAULT_TERMINAL_TOOLS: &[&str] = &["case_resolved", "case_not_resolved"];

/// Passed to tools that do not declare the context parameter.
static NO_CONTEXT: ContextVariables = ContextVariables::new();

/// Drives one active agent at a time through model calls, tool execution and handoffs.
pub struct Orchestrator {
    provider: Arc<dyn Provider>,
    registry: Arc<Registry>,
    max_turns: usize,
    model_override: Option<String>,
    terminal_tools: BTreeSet<String>,
}

struct RunState {
    agents: BTreeMap<String, Arc<Agent>>,
    active: Arc<Agent>,
    history: Vec<ChatMessage>,
    context: ContextVariables,
    turns: usize,
}

impl RunState {
    fn finish(self, status: RunStatus, abort_reason: Option<AbortReason>) -> Response {
        Response {
            messages: self.history,
            agent: self.active,
            context_variables: self.context,
            status,
            abort_reason,
            turns: self.turns,
        }
    }
}

impl Orchestrator {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            registry: Arc::new(Registry::default()),
            max_turns: DEFAULT_MAX_TURNS,
            model_override: None,
            terminal_tools: DEFAULT_TERMINAL_TOOLS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Registry consulted when a handoff names an agent not yet seen in the run.
    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Sends every model call to `model` regardless of the agent's own identifier.
    pub fn with_model_override(mut self, model: impl Into<String>) -> Self {
        self.model_override = Some(model.into());
        self
    }

    pub fn with_terminal_tools<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terminal_tools = names.into_iter().map(Into::into).collect();
        self
    }

    pub async fn run(
        &self,
        agent: Agent,
        history: Vec<ChatMessage>,
        context: ContextVariables,
    ) -> Response {
        let active = Arc::new(agent);
        let mut state = RunState {
            agents: BTreeMap::from([(active.name().to_string(), Arc::clone(&active))]),
            active,
            history,
            context,
            turns: 0,
        };

        loop {
            if state.turns >= self.max_turns {
                warn!(max_turns = self.max_turns, agent = %state.active.name(), "Turn limit reached, aborting run");
                let reason = AbortReason::TurnLimit {
                    max_turns: self.max_turns,
                };
                return state.finish(RunStatus::Aborted, Some(reason));
            }

            let agent = Arc::clone(&state.active);
            state.turns += 1;
            debug!(turn = state.turns, agent = %agent.name(), history = state.history.len(), "Awaiting model");

            let response = match self.call_model(&agent, &state).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(agent = %agent.name(), "Model call failed: {e:#}");
                    return state.finish(RunStatus::Aborted, Some(AbortReason::Model(format!("{e:#}"))));
                }
            };

            let text = response.text.unwrap_or_default();
            let mut calls = response.tool_calls;
            match agent.tool_choice() {
                ToolChoice::None => calls.clear(),
                ToolChoice::Tool(pinned) if calls.len() > 1 => {
                    let first = calls
                        .iter()
                        .position(|c| &c.name == pinned)
                        .unwrap_or(0);
                    debug!(tool = %pinned, dropped = calls.len() - 1, "Tool pinned, honoring one call only");
                    calls = vec![calls.swap_remove(first)];
                }
                _ => {}
            }
            if !agent.parallel_tool_calls() && calls.len() > 1 {
                debug!(deferred = calls.len() - 1, "Parallel tool calls disabled, honoring the first call only");
                calls.truncate(1);
            }

            if calls.is_empty() {
                state
                    .history
                    .push(ChatMessage::assistant(text).with_sender(agent.name()));
                debug!(turns = state.turns, agent = %agent.name(), "Run finished");
                return state.finish(RunStatus::Done, None);
            }

            state.history.push(
                ChatMessage::assistant_with_tool_calls(text, calls.clone()).with_sender(agent.name()),
            );

            let outcomes = self.execute_tools(&agent, &calls, &state.context).await;
            let terminal = self.apply_outcomes(&mut state, &agent, &calls, outcomes);

            if terminal {
                debug!(turns = state.turns, "Terminal tool executed, run finished");
                return state.finish(RunStatus::Done, None);
            }
        }
    }

    async fn call_model(
        &self,
        agent: &Agent,
        state: &RunState,
    ) -> anyhow::Result<crate::traits::ChatResponse> {
        let mut messages = Vec::with_capacity(state.history.len() + 1);
        messages.push(ChatMessage::system(agent.instructions(&state.context)));
        messages.extend(state.history.iter().cloned());

        let tools = agent.tool_specs();
        let offer_tools = !tools.is_empty() && *agent.tool_choice() != ToolChoice::None;
        let request = ChatRequest {
            model: self.model_override.as_deref().unwrap_or(agent.model()),
            messages: &messages,
            tools: offer_tools.then_some(tools),
            tool_choice: agent.tool_choice(),
            parallel_tool_calls: agent.parallel_tool_calls(),
        };

        self.provider.chat(request).await
    }

    /// Runs the calls of one turn. Every call sees the same pre-turn context;
    /// results come back in request order.
    async fn execute_tools(
        &self,
        agent: &Agent,
        calls: &[ToolCall],
        context: &ContextVariables,
    ) -> Vec<Result<ToolCallResult, Error>> {
        let dispatches = calls.iter().map(|call| self.dispatch(agent, call, context));

        if agent.parallel_tool_calls() {
            join_all(dispatches).await
        } else {
            let mut outcomes = Vec::with_capacity(calls.len());
            for dispatch in dispatches {
                outcomes.push(dispatch.await);
            }
            outcomes
        }
    }

    async fn dispatch(
        &self,
        agent: &Agent,
        call: &ToolCall,
        context: &ContextVariables,
    ) -> Result<ToolCallResult, Error> {
        let Some((tool, schema)) = agent.tool(&call.name) else {
            return Err(Error::UnknownTool {
                tool: call.name.clone(),
                agent: agent.name().to_string(),
            });
        };

        let args = schema
            .prepare_args(&call.arguments)
            .map_err(|e| Error::tool_failed(&call.name, format!("{e:#}")))?;
        let context = if schema.takes_context { context } else { &NO_CONTEXT };

        debug!(tool = %call.name, id = %call.id, "Executing tool");
        match AssertUnwindSafe(tool.execute(args, context)).catch_unwind().await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(Error::tool_failed(&call.name, format!("{e:#}"))),
            Err(panic) => Err(Error::tool_failed(&call.name, panic_message(panic.as_ref()))),
        }
    }

    /// Appends tool results in request order, merges context patches and
    /// commits the last requested handoff. Returns whether a terminal tool ran.
    fn apply_outcomes(
        &self,
        state: &mut RunState,
        agent: &Arc<Agent>,
        calls: &[ToolCall],
        outcomes: Vec<Result<ToolCallResult, Error>>,
    ) -> bool {
        let mut next: Option<Arc<Agent>> = None;
        let mut terminal = false;

        for (call, outcome) in calls.iter().zip(outcomes) {
            let (content, image) = match outcome {
                Ok(result) => {
                    terminal |= self.terminal_tools.contains(&call.name);
                    match result {
                        ToolCallResult::Value { text, image } => (text, image),
                        ToolCallResult::Handoff(target) => match self.resolve_agent(state, agent, &target) {
                            Ok(target) => {
                                let ack = serde_json::json!({ "assistant": target.name() }).to_string();
                                next = Some(target);
                                (ack, None)
                            }
                            Err(e) => (recovered(&call.name, &e), None),
                        },
                        ToolCallResult::HandoffWithValue {
                            text,
                            agent: target,
                            context,
                            image,
                        } => {
                            state.context.merge(context);
                            let text = match target.map(|t| self.resolve_agent(state, agent, &t)) {
                                Some(Ok(target)) => {
                                    next = Some(target);
                                    text
                                }
                                Some(Err(e)) => format!("{text}\n\n{}", recovered(&call.name, &e)),
                                None => text,
                            };
                            (text, image)
                        }
                    }
                }
                Err(e) => (recovered(&call.name, &e), None),
            };

            state.history.push(
                ChatMessage::tool_result(&call.id, &call.name, content)
                    .with_sender(agent.name())
                    .with_image(image),
            );
        }

        if let Some(next) = next
            && next.name() != state.active.name()
        {
            info!(from = %state.active.name(), to = %next.name(), "Handoff");
            state.active = next;
        }

        terminal
    }

    /// Resolves a handoff target by name: agents already in this run, then the
    /// active agent's sub-agents, then the registry.
    fn resolve_agent(&self, state: &mut RunState, active: &Agent, target: &str) -> Result<Arc<Agent>, Error> {
        if let Some(agent) = state.agents.get(target) {
            return Ok(Arc::clone(agent));
        }

        let model = self.model_override.as_deref().unwrap_or(active.model());
        let factory = match active.sub_agent(target) {
            Some(factory) => Arc::clone(factory),
            None => self
                .registry
                .agent_factory(target)
                .map_err(|e| Error::HandoffTargetMissing {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?,
        };

        let agent = factory(self.registry.as_ref(), model).map_err(|e| Error::HandoffTargetMissing {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        let agent = Arc::clone(
            state
                .agents
                .entry(agent.name().to_string())
                .or_insert_with(|| Arc::new(agent)),
        );
        state.agents.insert(target.to_string(), Arc::clone(&agent));
        Ok(agent)
    }
}

fn recovered(tool: &str, error: &Error) -> String {
    warn!(tool, "{error}");
    format!("Error: {error}")
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("tool panicked: {detail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentFactory;
    use crate::tools::FunctionTool;
    use crate::traits::{ChatResponse, Param, Role, Tool};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted responses and records what it was asked.
    struct ScriptedProvider {
        script: Mutex<VecDeque<ChatResponse>>,
        fallback: Option<ChatResponse>,
        requests: Mutex<Vec<(String, String, Vec<String>)>>,
    }

    impl ScriptedProvider {
        fn new(script: Vec<ChatResponse>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                fallback: None,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn repeating(response: ChatResponse) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(VecDeque::new()),
                fallback: Some(response),
                requests: Mutex::new(Vec::new()),
            })
        }

        /// (model, system prompt, offered tool names) of each call.
        fn requests(&self) -> Vec<(String, String, Vec<String>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn chat(&self, request: ChatRequest<'_>) -> anyhow::Result<ChatResponse> {
            let tools = request
                .tools
                .map(|tools| tools.iter().map(|t| t.name.clone()).collect())
                .unwrap_or_default();
            self.requests.lock().unwrap().push((
                request.model.to_string(),
                request.messages[0].content.clone(),
                tools,
            ));
            let next = self.script.lock().unwrap().pop_front();
            next.or_else(|| self.fallback.clone())
                .ok_or_else(|| anyhow::anyhow!("script exhausted"))
        }
    }

    fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
        ToolCall::new(id, name, args.to_string())
    }

    fn calls(calls: Vec<ToolCall>) -> ChatResponse {
        ChatResponse::with_tool_calls(calls)
    }

    fn value_tool(name: &str, output: &'static str) -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            name,
            format!("Return {output}."),
            vec![],
            move |_, _| Ok(ToolCallResult::value(output)),
        ))
    }

    fn set_tool(name: &str, key: &'static str, value: &'static str) -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            name,
            format!("Write {key}."),
            vec![],
            move |_, _| {
                Ok(ToolCallResult::with_context(
                    format!("{key} set"),
                    ContextVariables::new().with(key, value),
                ))
            },
        ))
    }

    fn read_tool() -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            "read_plan",
            "Read the plan from context.",
            vec![Param::context()],
            |_, ctx| Ok(ToolCallResult::value(ctx.get_str("plan").unwrap_or("none"))),
        ))
    }

    fn transfer(name: &str, target: &'static str) -> Arc<dyn Tool> {
        Arc::new(FunctionTool::new(
            name,
            format!("Transfer to {target}."),
            vec![],
            move |_, _| Ok(ToolCallResult::handoff(target)),
        ))
    }

    fn user(text: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::user(text)]
    }

    #[tokio::test]
    async fn plain_reply_finishes_immediately() {
        let provider = ScriptedProvider::new(vec![ChatResponse::text("hello")]);
        let agent = Agent::builder("Greeter").build().unwrap();

        let response = Orchestrator::new(provider.clone())
            .run(agent, user("hi"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.turns, 1);
        assert_eq!(response.messages.len(), 2);
        assert_eq!(response.output(), "hello");
        assert_eq!(response.messages[1].sender.as_deref(), Some("Greeter"));
        assert_eq!(provider.requests()[0].1, "You are a helpful agent.");
    }

    #[tokio::test]
    async fn value_turns_grow_history_by_calls_plus_one() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "alpha", json!({})), call("2", "beta", json!({}))]),
            calls(vec![call("3", "alpha", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Worker")
            .tool(value_tool("alpha", "A"))
            .tool(value_tool("beta", "B"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("go"), ContextVariables::new())
            .await;

        // 1 user + (2 + 1) + (1 + 1) + 1 final
        assert_eq!(response.messages.len(), 1 + 3 + 2 + 1);
        assert_eq!(response.agent.name(), "Worker");
        assert!(response.messages.iter().all(|m| m.sender.as_deref().is_none_or(|s| s == "Worker")));

        let tool_outputs: Vec<_> = response
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref().unwrap(), m.content.as_str()))
            .collect();
        assert_eq!(tool_outputs, vec![("1", "A"), ("2", "B"), ("3", "A")]);
    }

    #[tokio::test]
    async fn repeated_runs_are_identical() {
        let script = || {
            vec![
                calls(vec![call("1", "set_plan", json!({})), call("2", "read_plan", json!({}))]),
                calls(vec![call("3", "read_plan", json!({}))]),
                ChatResponse::text("finished"),
            ]
        };
        let agent = || {
            Agent::builder("Planner")
                .tool(set_tool("set_plan", "plan", "ship it"))
                .tool(read_tool())
                .build()
                .unwrap()
        };

        let first = Orchestrator::new(ScriptedProvider::new(script()))
            .run(agent(), user("plan"), ContextVariables::new())
            .await;
        let second = Orchestrator::new(ScriptedProvider::new(script()))
            .run(agent(), user("plan"), ContextVariables::new())
            .await;

        assert_eq!(first.messages, second.messages);
        assert_eq!(first.context_variables, second.context_variables);
        assert_eq!(first.agent.name(), second.agent.name());
        assert_eq!(first.status, second.status);
    }

    #[tokio::test]
    async fn handoff_applies_after_the_whole_turn() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![
                call("1", "alpha", json!({})),
                call("2", "transfer_to_specialist", json!({})),
            ]),
            ChatResponse::text("specialist here"),
        ]);
        let specialist = Agent::builder("Specialist")
            .instructions("You are the specialist.")
            .build()
            .unwrap();
        let specialist: AgentFactory = {
            let specialist = specialist.clone();
            Arc::new(move |_: &Registry, _: &str| -> Result<Agent, Error> { Ok(specialist.clone()) })
        };
        let triage = Agent::builder("Triage")
            .tool(value_tool("alpha", "A"))
            .tool(transfer("transfer_to_specialist", "Specialist"))
            .sub_agent("Specialist", specialist)
            .build()
            .unwrap();

        let response = Orchestrator::new(provider.clone())
            .run(triage, user("help"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.agent.name(), "Specialist");

        let roles: Vec<_> = response.messages.iter().map(|m| (m.role, m.sender.clone())).collect();
        assert_eq!(
            roles,
            vec![
                (Role::User, None),
                (Role::Assistant, Some("Triage".to_string())),
                (Role::Tool, Some("Triage".to_string())),
                (Role::Tool, Some("Triage".to_string())),
                (Role::Assistant, Some("Specialist".to_string())),
            ]
        );
        assert_eq!(response.messages[2].content, "A");
        assert_eq!(response.messages[3].content, r#"{"assistant":"Specialist"}"#);

        let requests = provider.requests();
        assert_eq!(requests[1].1, "You are the specialist.");
    }

    #[tokio::test]
    async fn handoffs_resolve_through_the_registry_and_back() {
        let mut builder = Registry::builder();
        builder.register_agent("Coder", "get_coder_agent", "Writes code.", |_, model| {
            Ok(Agent::builder("Coder")
                .model(model)
                .tool(transfer("transfer_back_to_triage", "Triage"))
                .build()?)
        });
        let registry = Arc::new(builder.build());

        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "transfer_to_coder", json!({}))]),
            calls(vec![call("2", "transfer_back_to_triage", json!({}))]),
            ChatResponse::text("all done"),
        ]);
        let triage = Agent::builder("Triage")
            .model("triage-model")
            .tool(transfer("transfer_to_coder", "get_coder_agent"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider.clone())
            .with_registry(registry)
            .run(triage, user("code"), ContextVariables::new())
            .await;

        assert_eq!(response.agent.name(), "Triage");
        assert_eq!(response.messages[2].content, r#"{"assistant":"Coder"}"#);
        let senders: Vec<_> = response
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.sender.clone().unwrap())
            .collect();
        assert_eq!(senders, vec!["Triage", "Coder", "Triage"]);
        assert_eq!(provider.requests()[1].0, "triage-model");
    }

    #[tokio::test]
    async fn missing_handoff_target_is_reported_to_the_model() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "transfer_to_ghost", json!({}))]),
            ChatResponse::text("ok"),
        ]);
        let agent = Agent::builder("Triage")
            .tool(transfer("transfer_to_ghost", "Ghost"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("?"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.agent.name(), "Triage");
        assert!(response.messages[2].content.starts_with("Error: handoff target 'Ghost'"));
    }

    #[tokio::test]
    async fn context_patches_merge_in_request_order() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![
                call("1", "set_first", json!({})),
                call("2", "set_other", json!({})),
                call("3", "set_second", json!({})),
            ]),
            calls(vec![call("4", "read_plan", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Planner")
            .tool(set_tool("set_first", "plan", "first"))
            .tool(set_tool("set_other", "owner", "me"))
            .tool(set_tool("set_second", "plan", "second"))
            .tool(read_tool())
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("plan"), ContextVariables::new().with("keep", "yes"))
            .await;

        let ctx = &response.context_variables;
        assert_eq!(ctx.get_str("plan"), Some("second"));
        assert_eq!(ctx.get_str("owner"), Some("me"));
        assert_eq!(ctx.get_str("keep"), Some("yes"));
        assert_eq!(response.messages[6].content, "second");
    }

    #[tokio::test]
    async fn parallel_calls_share_the_pre_turn_snapshot() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "set_plan", json!({})), call("2", "read_plan", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Planner")
            .tool(set_tool("set_plan", "plan", "fresh"))
            .tool(read_tool())
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("plan"), ContextVariables::new())
            .await;

        assert_eq!(response.messages[3].content, "none");
        assert_eq!(response.context_variables.get_str("plan"), Some("fresh"));
    }

    #[tokio::test]
    async fn turn_limit_aborts_with_partial_history() {
        let provider = ScriptedProvider::repeating(calls(vec![call("x", "alpha", json!({}))]));
        let agent = Agent::builder("Looper")
            .tool(value_tool("alpha", "A"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider.clone())
            .with_max_turns(4)
            .run(agent, user("loop"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Aborted);
        assert_eq!(response.abort_reason, Some(AbortReason::TurnLimit { max_turns: 4 }));
        assert!(matches!(response.error(), Some(Error::LoopBoundExceeded { max_turns: 4 })));
        assert_eq!(response.turns, 4);
        assert_eq!(provider.requests().len(), 4);
        assert_eq!(response.messages.len(), 1 + 4 * 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_recovered() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "rm_rf", json!({}))]),
            ChatResponse::text("sorry"),
        ]);
        let agent = Agent::builder("Careful")
            .tool(value_tool("alpha", "A"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        let tool_messages: Vec<_> = response.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].content, "Error: unknown tool 'rm_rf' for agent 'Careful'");
    }

    #[tokio::test]
    async fn tool_faults_become_messages() {
        let failing: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "flaky",
            "Always fails.",
            vec![],
            |_, _| Err(anyhow::anyhow!("disk full")),
        ));
        let panicking: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "explode",
            "Always panics.",
            vec![],
            |_, _| panic!("kaboom"),
        ));
        let needs_args: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "needs_path",
            "Needs a path.\n\nArgs:\n    path: Where.",
            vec![Param::required("path", "string")],
            |_, _| Ok(ToolCallResult::value("ok")),
        ));
        let provider = ScriptedProvider::new(vec![
            calls(vec![
                call("1", "flaky", json!({})),
                call("2", "explode", json!({})),
                call("3", "needs_path", json!({})),
            ]),
            ChatResponse::text("recovered"),
        ]);
        let agent = Agent::builder("Brave")
            .tools([failing, panicking, needs_args])
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.messages[2].content, "Error: tool 'flaky' failed: disk full");
        assert_eq!(
            response.messages[3].content,
            "Error: tool 'explode' failed: tool panicked: kaboom"
        );
        assert!(response.messages[4].content.contains("missing required argument 'path'"));
        assert_eq!(response.output(), "recovered");
    }

    #[tokio::test]
    async fn sequential_agents_honor_only_the_first_call() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "alpha", json!({})), call("2", "beta", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Serial")
            .tool(value_tool("alpha", "A"))
            .tool(value_tool("beta", "B"))
            .parallel_tool_calls(false)
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.messages[1].tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(response.messages[2].content, "A");
        assert_eq!(response.messages.len(), 4);
    }

    #[tokio::test]
    async fn calls_from_a_toolless_agent_are_unknown_tools() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "ghost", json!({}))]),
            ChatResponse::text("after"),
        ]);
        let agent = Agent::builder("Bare").build().unwrap();

        let response = Orchestrator::new(provider.clone())
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.turns, 2);
        let tool_messages: Vec<_> = response.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].content, "Error: unknown tool 'ghost' for agent 'Bare'");
        assert_eq!(response.output(), "after");
        assert!(provider.requests()[0].2.is_empty());
    }

    #[tokio::test]
    async fn handoff_with_value_reports_merges_and_switches() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "report_back", json!({}))]),
            ChatResponse::text("back at triage"),
        ]);
        let report_back: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "report_back",
            "Report and return.",
            vec![],
            |_, _| {
                Ok(ToolCallResult::handoff_with_value(
                    "status: app.py written",
                    "Triage",
                    ContextVariables::new().with("artifact", "app.py"),
                ))
            },
        ));
        let triage = Agent::builder("Triage")
            .instructions("You are triage.")
            .build()
            .unwrap();
        let triage: AgentFactory = {
            let triage = triage.clone();
            Arc::new(move |_: &Registry, _: &str| -> Result<Agent, Error> { Ok(triage.clone()) })
        };
        let worker = Agent::builder("Worker")
            .instructions("You are the worker.")
            .tool(report_back)
            .sub_agent("Triage", triage)
            .build()
            .unwrap();

        let response = Orchestrator::new(provider.clone())
            .run(worker, user("build it"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.messages[2].role, Role::Tool);
        assert_eq!(response.messages[2].content, "status: app.py written");
        assert_eq!(response.context_variables.get_str("artifact"), Some("app.py"));
        assert_eq!(response.agent.name(), "Triage");
        let prompts: Vec<_> = provider.requests().into_iter().map(|r| r.1).collect();
        assert_eq!(prompts, vec!["You are the worker.", "You are triage."]);
        assert_eq!(response.messages[3].sender.as_deref(), Some("Triage"));
    }

    #[tokio::test]
    async fn pinned_tool_choice_honors_one_call() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "alpha", json!({})), call("2", "beta", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Pinned")
            .tool(value_tool("alpha", "A"))
            .tool(value_tool("beta", "B"))
            .tool_choice(ToolChoice::Tool("beta".into()))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        let recorded = response.messages[1].tool_calls.as_ref().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].name, "beta");
        let tool_messages: Vec<_> = response.messages.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 1);
        assert_eq!(tool_messages[0].content, "B");
    }

    #[tokio::test]
    async fn tool_choice_none_forces_a_plain_reply() {
        let provider = ScriptedProvider::new(vec![calls(vec![call("1", "alpha", json!({}))])]);
        let agent = Agent::builder("Quiet")
            .tool(value_tool("alpha", "A"))
            .tool_choice(ToolChoice::None)
            .build()
            .unwrap();

        let response = Orchestrator::new(provider.clone())
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.messages.len(), 2);
        assert!(!response.messages[1].has_tool_calls());
        assert!(provider.requests()[0].2.is_empty());
    }

    #[tokio::test]
    async fn terminal_tool_ends_the_run() {
        let provider = ScriptedProvider::repeating(calls(vec![call(
            "1",
            "case_resolved",
            json!({}),
        )]));
        let agent = Agent::builder("Closer")
            .tool(value_tool("case_resolved", "resolved"))
            .build()
            .unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Done);
        assert_eq!(response.turns, 1);
        assert_eq!(response.output(), "resolved");
    }

    #[tokio::test]
    async fn context_is_only_injected_when_declared() {
        let blind: Arc<dyn Tool> = Arc::new(FunctionTool::new(
            "blind",
            "Counts visible context keys.",
            vec![],
            |_, ctx| Ok(ToolCallResult::value(ctx.len().to_string())),
        ));
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "blind", json!({})), call("2", "read_plan", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Mixed").tool(blind).tool(read_tool()).build().unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new().with("plan", "secret"))
            .await;

        assert_eq!(response.messages[2].content, "0");
        assert_eq!(response.messages[3].content, "secret");
    }

    #[tokio::test]
    async fn model_failure_still_returns_a_response() {
        let provider = ScriptedProvider::new(vec![]);
        let agent = Agent::builder("Lonely").build().unwrap();

        let response = Orchestrator::new(provider)
            .run(agent, user("x"), ContextVariables::new())
            .await;

        assert_eq!(response.status, RunStatus::Aborted);
        assert!(matches!(response.abort_reason, Some(AbortReason::Model(ref m)) if m.contains("script exhausted")));
        assert_eq!(response.messages.len(), 1);
    }

    #[tokio::test]
    async fn instructions_see_context_written_in_earlier_turns() {
        let provider = ScriptedProvider::new(vec![
            calls(vec![call("1", "set_plan", json!({}))]),
            ChatResponse::text("done"),
        ]);
        let agent = Agent::builder("Planner")
            .instructions_fn(|ctx| format!("plan={}", ctx.get_str("plan").unwrap_or("-")))
            .tool(set_tool("set_plan", "plan", "draft"))
            .build()
            .unwrap();

        Orchestrator::new(provider.clone())
            .run(agent, user("x"), ContextVariables::new())
            .await;

        let prompts: Vec<_> = provider.requests().into_iter().map(|r| r.1).collect();
        assert_eq!(prompts, vec!["plan=-", "plan=draft"]);
    }
}
