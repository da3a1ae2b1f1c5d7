use crate::agent::{Agent, AgentFactory, ToolChoice};
use crate::error::{Error, SchemaError};
use crate::registry::{Registry, RegistryBuilder};
use crate::tools::{BrowserActionTool, register_builtin_tools, transfer_back_to, transfer_to};
use crate::traits::Tool;
use std::sync::Arc;

pub const TRIAGE_AGENT: &str = "System Triage Agent";
pub const PROGRAMMING_AGENT: &str = "Programming Agent";
pub const BROWSING_AGENT: &str = "Browsing Agent";
pub const TOOL_EDITOR_AGENT: &str = "Tool Editor Agent";

const CODE_TOOLS: &[&str] = &[
    "execute_command",
    "run_python",
    "read_file",
    "create_file",
    "write_file",
    "create_directory",
    "list_files",
    "gen_code_tree_structure",
];

const PLUGIN_TOOLS: &[&str] = &[
    "list_tools",
    "create_tool",
    "update_tool",
    "delete_tool",
    "test_tool",
    "read_file",
    "gen_code_tree_structure",
];

fn working_dir(context: &crate::context::ContextVariables) -> &str {
    context.get_str("working_dir").unwrap_or("workplace")
}

pub fn get_system_triage_agent(registry: &Registry, model: &str) -> Result<Agent, Error> {
    let programming: AgentFactory = Arc::new(get_programming_agent);
    let browsing: AgentFactory = Arc::new(get_browsing_agent);
    let tool_editor: AgentFactory = Arc::new(get_tool_editor_agent);

    Ok(Agent::builder(TRIAGE_AGENT)
        .model(model)
        .instructions_fn(|ctx| {
            format!(
                "You are a helpful assistant that can help the user with their request.\n\
                 Based on the state of solving the user's task, your responsibility is to determine which agent is best suited to handle the user's request under the current context, and transfer the conversation to that agent.\n\
                 Use `transfer_to_programming_agent` for work on files or code in /{wd}, `transfer_to_browsing_agent` for work that needs the web and `transfer_to_tool_editor_agent` to create, change or test plugin tools.\n\
                 When the task is complete call `case_resolved`; when no agent can make progress call `case_not_resolved`.",
                wd = working_dir(ctx)
            )
        })
        .tool(transfer_to(
            "transfer_to_programming_agent",
            PROGRAMMING_AGENT,
            "Use this function when you want to transfer the conversation to the Programming Agent.",
        ))
        .tool(transfer_to(
            "transfer_to_browsing_agent",
            BROWSING_AGENT,
            "Use this function when you want to transfer the conversation to the Browsing Agent.",
        ))
        .tool(transfer_to(
            "transfer_to_tool_editor_agent",
            TOOL_EDITOR_AGENT,
            "Use this function when you want to transfer the conversation to the Tool Editor Agent.",
        ))
        .tools(registry.tools(["case_resolved", "case_not_resolved"])?)
        .tool_choice(ToolChoice::Required)
        .parallel_tool_calls(false)
        .sub_agent(PROGRAMMING_AGENT, programming)
        .sub_agent(BROWSING_AGENT, browsing)
        .sub_agent(TOOL_EDITOR_AGENT, tool_editor)
        .build()?)
}

pub fn get_programming_agent(registry: &Registry, model: &str) -> Result<Agent, Error> {
    Ok(Agent::builder(PROGRAMMING_AGENT)
        .model(model)
        .instructions_fn(|ctx| {
            format!(
                "You are a programmer working in the directory /{wd}.\n\
                 1. Look at the existing code with `gen_code_tree_structure` and create project structures with `create_directory`.\n\
                 2. Write clean, documented code with `create_file` and `write_file`; never create empty files.\n\
                 3. Run python scripts with `run_python` rather than `execute_command`.\n\
                 4. Read a file with `read_file` before changing it and keep as much of the original as possible.\n\
                 5. Every path you read or write must be absolute (starting with '/').\n\
                 When your part is done, or you cannot proceed, use `transfer_back_to_triage_agent` to report the status.",
                wd = working_dir(ctx)
            )
        })
        .tools(registry.tools(CODE_TOOLS.iter().copied())?)
        .tool(transfer_back_to("transfer_back_to_triage_agent", TRIAGE_AGENT))
        .tool_choice(ToolChoice::Auto)
        .parallel_tool_calls(false)
        .build()?)
}

pub fn get_browsing_agent(registry: &Registry, model: &str) -> Result<Agent, Error> {
    let browser_tools = BrowserActionTool::all()
        .into_iter()
        .map(|tool| registry.tool(tool.name()).unwrap_or(tool));

    Ok(Agent::builder(BROWSING_AGENT)
        .model(model)
        .instructions_fn(|ctx| {
            let goal = ctx.get_str("goal").unwrap_or_default();
            format!(
                "Review the current state of the page and all other information to find the best possible next action to accomplish your goal.\n\
                 Your answer will be interpreted and executed by a program, make sure to follow the formatting instructions.\n\n\
                 # Goal:\n{goal}\n\n\
                 When the goal is reached, or the page cannot get you closer to it, use `transfer_back_to_triage_agent` to report what you found."
            )
        })
        .tools(browser_tools)
        .tool(transfer_back_to("transfer_back_to_triage_agent", TRIAGE_AGENT))
        .parallel_tool_calls(false)
        .build()?)
}

pub fn get_tool_editor_agent(registry: &Registry, model: &str) -> Result<Agent, Error> {
    Ok(Agent::builder(TOOL_EDITOR_AGENT)
        .model(model)
        .instructions_fn(|ctx| {
            format!(
                "You are a tool editor. Plugin tools are python modules in /{wd}/plugins, one module per tool named after it.\n\
                 Use `list_tools` to see what is already registered, so you do not duplicate a built-in tool.\n\
                 Create a tool with `create_tool`, change it with `update_tool` and remove it with `delete_tool`.\n\
                 Always check a new or changed tool with `test_tool`; fix the tool until its test passes.\n\
                 When your part is done, or you cannot proceed, use `transfer_back_to_triage_agent` to report the status.",
                wd = working_dir(ctx)
            )
        })
        .tools(registry.tools(PLUGIN_TOOLS.iter().copied())?)
        .tool(transfer_back_to("transfer_back_to_triage_agent", TRIAGE_AGENT))
        .parallel_tool_calls(false)
        .build()?)
}

pub fn register_builtin_agents(builder: &mut RegistryBuilder) {
    builder
        .register_agent(
            TRIAGE_AGENT,
            "get_system_triage_agent",
            "Routes the user's request to the agent best suited to handle it.",
            get_system_triage_agent,
        )
        .register_agent(
            PROGRAMMING_AGENT,
            "get_programming_agent",
            "Writes, runs and debugs code inside the code environment.",
            get_programming_agent,
        )
        .register_agent(
            BROWSING_AGENT,
            "get_browsing_agent",
            "Navigates web pages through the browser environment.",
            get_browsing_agent,
        )
        .register_agent(
            TOOL_EDITOR_AGENT,
            "get_tool_editor_agent",
            "Creates, updates, deletes and tests plugin tools in the code environment.",
            get_tool_editor_agent,
        );
}

/// Registry holding every built-in tool and agent.
pub fn builtin_registry() -> Result<Registry, SchemaError> {
    let mut builder = Registry::builder();
    register_builtin_tools(&mut builder)?;
    register_builtin_agents(&mut builder);
    Ok(builder.build())
}
