//! Closure-backed tool
//!
//! Wraps a synchronous function as a `Tool`, for quick adapters over
//! document stores, query engines and parsers that do their own I/O.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::tool::Tool;
use crate::core::ToolContext;
use crate::llm::ToolInputSchema;

type ToolFn = dyn Fn(&mut ToolContext, &Value) -> Result<Value> + Send + Sync;

/// A tool implemented by a closure
///
/// # Example
///
/// ```ignore
/// let tool = FunctionTool::new("run_query", "Run a read-only SQL query", |ctx, args| {
///     let db = ctx.resource::<Database>().ok_or_else(|| anyhow!("no database"))?;
///     db.query(args["q"].as_str().unwrap_or_default())
/// })
/// .with_schema(ToolInputSchema::new().with_required(vec!["q".into()]));
/// ```
pub struct FunctionTool {
    name: String,
    description: String,
    schema: ToolInputSchema,
    func: Box<ToolFn>,
}

impl FunctionTool {
    /// Create a tool with an empty object schema
    pub fn new<F>(name: impl Into<String>, description: impl Into<String>, func: F) -> Self
    where
        F: Fn(&mut ToolContext, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema: ToolInputSchema::new(),
            func: Box::new(func),
        }
    }

    /// Set the argument schema
    pub fn with_schema(mut self, schema: ToolInputSchema) -> Self {
        self.schema = schema;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> ToolInputSchema {
        self.schema.clone()
    }

    async fn execute(&self, ctx: &mut ToolContext, args: &Value) -> Result<Value> {
        (self.func)(ctx, args)
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition() {
        let tool = FunctionTool::new("parse_file", "Parse an uploaded file", |_, _| Ok(json!({})))
            .with_schema(ToolInputSchema::new().with_required(vec!["path".into()]));

        let def = tool.definition();
        assert_eq!(def.name, "parse_file");
        assert_eq!(def.description, "Parse an uploaded file");
        assert_eq!(def.input_schema.required, Some(vec!["path".to_string()]));
    }
}
