//! Delegation Demo
//!
//! Runs two turns against a scripted backend:
//! 1. The root agent hands off to a data analyst, which runs a query and
//!    answers; the answer lands in session state under `analyst_result`.
//! 2. The follow-up resumes at the analyst, which releases control.
//!
//! Every event is printed as an SSE frame.
//!
//! Run with: cargo run --example delegation_demo

use std::sync::Arc;

use anyhow::{anyhow, Result};
use orchestra_sdk::{
    encode_sse,
    llm::{ScriptStep, ToolInputSchema},
    logging::{init_logging, LogConfig},
    AgentDefinition, AgentRegistry, FunctionTool, ModelResponse, Orchestrator, OrchestratorConfig,
    ScriptedBackend, SessionKey, ToolRegistry, TurnRequest,
};
use serde_json::json;

const APP: &str = "analytics";

fn agent_tree() -> Result<AgentRegistry> {
    let tree = AgentRegistry::new(
        "Orchestrator",
        vec![
            AgentDefinition::new("Orchestrator")
                .with_instruction("Route data questions to the analyst. Last answer: {analyst_result?}")
                .with_child("DataAnalyst"),
            AgentDefinition::new("DataAnalyst")
                .with_description("Answers data questions with SQL")
                .with_instruction("Answer using run_query.")
                .with_tool("run_query")
                .with_output_key("analyst_result")
                .with_transfer_to_parent(true),
        ],
    )?;
    Ok(tree)
}

fn tools() -> Result<ToolRegistry> {
    let mut tools = ToolRegistry::new();
    tools.register(
        FunctionTool::new("run_query", "Run a read-only SQL query", |ctx, args| {
            let query = args["q"]
                .as_str()
                .ok_or_else(|| anyhow!("missing query"))?;
            ctx.set_state("last_query", query);
            Ok(json!({ "rows": [[42]] }))
        })
        .with_schema(ToolInputSchema::new().with_required(vec!["q".into()])),
    )?;
    Ok(tools)
}

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logging(LogConfig::default())?;

    let backend = Arc::new(ScriptedBackend::new(vec![
        ScriptStep::Respond(ModelResponse::transfer("DataAnalyst")),
        ScriptStep::Respond(ModelResponse::tool_call(
            "run_query",
            json!({ "q": "SELECT count(*) FROM orders" }),
        )),
        ScriptStep::Respond(ModelResponse::text("There are 42 orders.")),
        ScriptStep::Respond(ModelResponse::final_text("Nothing changed since then.")),
    ]));

    let orchestrator = Orchestrator::builder()
        .config(OrchestratorConfig::default())
        .agents(agent_tree()?)
        .tools(tools()?)
        .backend(backend)
        .build()?;

    for message in ["How many orders do we have?", "Still the same?"] {
        println!("=== {} ===", message);
        let (mut stream, handle) = orchestrator
            .submit(TurnRequest::new(APP, "u1", "S1", message))
            .await?;

        while let Some(event) = stream.next_event().await {
            print!("{}", encode_sse(&event)?);
        }

        let outcome = handle.join().await?;
        println!(
            "turn {} ended in {:?} at {}\n",
            outcome.turn_id, outcome.phase, outcome.final_agent
        );
    }

    let snapshot = orchestrator
        .session(&SessionKey::new(APP, "u1", "S1"))
        .await?;
    println!("state: {}", serde_json::to_string_pretty(&snapshot.state)?);

    Ok(())
}
