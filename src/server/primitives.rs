//! Handler contracts consumed by the router: the tool, resource and prompt
//! provider traits, their capability-carrying set wrappers, and ready-made
//! static implementations.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{McpError, McpResult};
use crate::protocol::prompts::{Prompt, PromptListChangedNotification, PromptMessage};
use crate::protocol::resources::{
    Resource, ResourceContent, ResourceListChangedNotification, ResourceTemplate,
    ResourceUpdatedNotification,
};
use crate::protocol::tools::{Content, Tool, ToolListChangedNotification, ToolOutcome};
use crate::server::event_bus::EventSender;

/// A page of items plus the cursor for the next page, if any.
pub type Page<T> = (Vec<T>, Option<String>);

/// Exposes tools to the router.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    async fn list(&self, cursor: Option<String>) -> McpResult<Page<Tool>>;

    async fn call(&self, name: &str, args: Value) -> McpResult<ToolOutcome>;

    /// Hand the provider the channel it should push list-change events into.
    /// Called once at session start when the set advertises `listChanged`.
    async fn watch_list_changed(
        &self,
        _sink: EventSender<ToolListChangedNotification>,
    ) -> McpResult<()> {
        Ok(())
    }
}

/// Exposes resources to the router.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    fn templates(&self) -> Vec<ResourceTemplate>;

    async fn list(&self, cursor: Option<String>) -> McpResult<Page<Resource>>;

    async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContent>>;

    async fn subscribe(
        &self,
        uri: &str,
        sink: EventSender<ResourceUpdatedNotification>,
    ) -> McpResult<()>;

    async fn unsubscribe(&self, uri: &str) -> McpResult<()>;

    async fn watch_list_changed(
        &self,
        _sink: EventSender<ResourceListChangedNotification>,
    ) -> McpResult<()> {
        Ok(())
    }
}

/// Exposes prompts to the router.
#[async_trait]
pub trait PromptProvider: Send + Sync {
    async fn list(&self, cursor: Option<String>) -> McpResult<Page<Prompt>>;

    async fn get(
        &self,
        name: &str,
        args: HashMap<String, String>,
    ) -> McpResult<(Option<String>, Vec<PromptMessage>)>;

    async fn watch_list_changed(
        &self,
        _sink: EventSender<PromptListChangedNotification>,
    ) -> McpResult<()> {
        Ok(())
    }
}

/// A tool provider plus the capability flags it advertises.
#[derive(Clone)]
pub struct ToolSet {
    provider: Arc<dyn ToolProvider>,
    list_changed: bool,
}

impl ToolSet {
    pub fn new<P: ToolProvider + 'static>(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn ToolProvider>) -> Self {
        Self {
            provider,
            list_changed: false,
        }
    }

    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }

    pub fn provider(&self) -> Arc<dyn ToolProvider> {
        Arc::clone(&self.provider)
    }

    pub fn list_changed(&self) -> bool {
        self.list_changed
    }
}

/// A resource provider plus the capability flags it advertises.
#[derive(Clone)]
pub struct ResourceSet {
    provider: Arc<dyn ResourceProvider>,
    subscribe: bool,
    list_changed: bool,
}

impl ResourceSet {
    pub fn new<P: ResourceProvider + 'static>(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn ResourceProvider>) -> Self {
        Self {
            provider,
            subscribe: false,
            list_changed: false,
        }
    }

    pub fn with_subscribe(mut self, subscribe: bool) -> Self {
        self.subscribe = subscribe;
        self
    }

    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }

    pub fn provider(&self) -> Arc<dyn ResourceProvider> {
        Arc::clone(&self.provider)
    }

    pub fn subscribe(&self) -> bool {
        self.subscribe
    }

    pub fn list_changed(&self) -> bool {
        self.list_changed
    }
}

/// A prompt provider plus the capability flags it advertises.
#[derive(Clone)]
pub struct PromptSet {
    provider: Arc<dyn PromptProvider>,
    list_changed: bool,
}

impl PromptSet {
    pub fn new<P: PromptProvider + 'static>(provider: P) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn PromptProvider>) -> Self {
        Self {
            provider,
            list_changed: false,
        }
    }

    pub fn with_list_changed(mut self, list_changed: bool) -> Self {
        self.list_changed = list_changed;
        self
    }

    pub fn provider(&self) -> Arc<dyn PromptProvider> {
        Arc::clone(&self.provider)
    }

    pub fn list_changed(&self) -> bool {
        self.list_changed
    }
}

/// One callable tool: definition metadata plus the invocation itself.
#[async_trait]
pub trait ToolUnit: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the arguments, opaque to the framework.
    fn input_schema(&self) -> Value;

    async fn call(&self, args: Value) -> McpResult<ToolOutcome>;
}

/// Wraps a plain async function as a [`ToolUnit`], decoding arguments into a
/// serde type once per call.
pub struct FnTool<T, F, Fut> {
    name: String,
    description: String,
    schema: Value,
    callback: F,
    _marker: PhantomData<fn() -> (T, Fut)>,
}

impl<T, F, Fut> FnTool<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<Vec<Content>>> + Send,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: Value,
        callback: F,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            callback,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, F, Fut> ToolUnit for FnTool<T, F, Fut>
where
    T: DeserializeOwned + Send,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = McpResult<Vec<Content>>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn call(&self, args: Value) -> McpResult<ToolOutcome> {
        let decoded: T = serde_json::from_value(args)
            .map_err(|e| McpError::invalid_params(format!("bad tool arguments: {}", e)))?;
        let content = (self.callback)(decoded).await?;
        Ok(ToolOutcome::success(content))
    }
}

/// A fixed collection of [`ToolUnit`]s exposed as a [`ToolProvider`].
#[derive(Default)]
pub struct StaticTools {
    units: Vec<Arc<dyn ToolUnit>>,
}

impl StaticTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool<U: ToolUnit + 'static>(mut self, unit: U) -> Self {
        self.units.push(Arc::new(unit));
        self
    }
}

#[async_trait]
impl ToolProvider for StaticTools {
    async fn list(&self, _cursor: Option<String>) -> McpResult<Page<Tool>> {
        let tools = self
            .units
            .iter()
            .map(|u| Tool {
                name: u.name().to_string(),
                description: Some(u.description().to_string()),
                input_schema: u.input_schema(),
            })
            .collect();
        Ok((tools, None))
    }

    async fn call(&self, name: &str, args: Value) -> McpResult<ToolOutcome> {
        let unit = self
            .units
            .iter()
            .find(|u| u.name() == name)
            .ok_or_else(|| McpError::tool_not_found(name))?;
        unit.call(args).await
    }
}

/// A fixed set of resources with in-process update fan-out for subscribers.
#[derive(Default)]
pub struct StaticResources {
    templates: Vec<ResourceTemplate>,
    entries: Vec<(Resource, Vec<ResourceContent>)>,
    watchers: DashMap<String, EventSender<ResourceUpdatedNotification>>,
}

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, template: ResourceTemplate) -> Self {
        self.templates.push(template);
        self
    }

    pub fn with_resource(mut self, resource: Resource, contents: Vec<ResourceContent>) -> Self {
        self.entries.push((resource, contents));
        self
    }

    /// Push an update notification to the subscriber of `uri`, if any.
    pub async fn notify_updated(&self, uri: &str) -> McpResult<()> {
        // Clone the sender out so no map guard is held across the send.
        let sink = self.watchers.get(uri).map(|entry| entry.value().clone());
        if let Some(sink) = sink {
            sink.send(ResourceUpdatedNotification {
                uri: uri.to_string(),
            })
            .await
            .map_err(|_| McpError::ConnectionClosed)?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for StaticResources {
    fn templates(&self) -> Vec<ResourceTemplate> {
        self.templates.clone()
    }

    async fn list(&self, _cursor: Option<String>) -> McpResult<Page<Resource>> {
        Ok((
            self.entries.iter().map(|(r, _)| r.clone()).collect(),
            None,
        ))
    }

    async fn read(&self, uri: &str) -> McpResult<Vec<ResourceContent>> {
        self.entries
            .iter()
            .find(|(r, _)| r.uri == uri)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| McpError::resource_not_found(uri))
    }

    async fn subscribe(
        &self,
        uri: &str,
        sink: EventSender<ResourceUpdatedNotification>,
    ) -> McpResult<()> {
        if !self.entries.iter().any(|(r, _)| r.uri == uri) {
            return Err(McpError::resource_not_found(uri));
        }
        self.watchers.insert(uri.to_string(), sink);
        Ok(())
    }

    async fn unsubscribe(&self, uri: &str) -> McpResult<()> {
        self.watchers
            .remove(uri)
            .map(|_| ())
            .ok_or_else(|| McpError::resource_unsubscribe(format!("no watch on {}", uri)))
    }
}

/// A fixed set of prompts rendered from stored messages.
#[derive(Default)]
pub struct StaticPrompts {
    entries: Vec<(Prompt, Vec<PromptMessage>)>,
}

impl StaticPrompts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prompt(mut self, prompt: Prompt, messages: Vec<PromptMessage>) -> Self {
        self.entries.push((prompt, messages));
        self
    }
}

#[async_trait]
impl PromptProvider for StaticPrompts {
    async fn list(&self, _cursor: Option<String>) -> McpResult<Page<Prompt>> {
        Ok((self.entries.iter().map(|(p, _)| p.clone()).collect(), None))
    }

    async fn get(
        &self,
        name: &str,
        _args: HashMap<String, String>,
    ) -> McpResult<(Option<String>, Vec<PromptMessage>)> {
        self.entries
            .iter()
            .find(|(p, _)| p.name == name)
            .map(|(p, messages)| (p.description.clone(), messages.clone()))
            .ok_or_else(|| McpError::prompt_not_found(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::event_bus::event_bus;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoArgs {
        message: String,
    }

    type BoxedCall =
        std::pin::Pin<Box<dyn std::future::Future<Output = McpResult<Vec<Content>>> + Send>>;

    fn echo(args: EchoArgs) -> BoxedCall {
        Box::pin(async move { Ok(vec![Content::text(args.message)]) })
    }

    fn echo_tool() -> FnTool<EchoArgs, fn(EchoArgs) -> BoxedCall, BoxedCall> {
        FnTool::new(
            "echo",
            "echoes its input",
            json!({"type": "object", "properties": {"message": {"type": "string"}}}),
            echo as fn(EchoArgs) -> BoxedCall,
        )
    }

    #[tokio::test]
    async fn test_fn_tool_decodes_and_calls() {
        let tool = echo_tool();
        let outcome = tool.call(json!({"message": "hi"})).await.unwrap();
        assert!(!outcome.is_error);
        match &outcome.content[0] {
            Content::Text { text, .. } => assert_eq!(text, "hi"),
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fn_tool_rejects_bad_arguments() {
        let tool = echo_tool();
        let err = tool.call(json!({"message": 42})).await.unwrap_err();
        assert_eq!(err.code(), Some(-32602));
    }

    #[tokio::test]
    async fn test_static_tools_lookup() {
        let tools = StaticTools::new().with_tool(echo_tool());
        let (defs, cursor) = tools.list(None).await.unwrap();
        assert_eq!(defs.len(), 1);
        assert!(cursor.is_none());

        let err = tools.call("missing", json!({})).await.unwrap_err();
        assert_eq!(err.code(), Some(-32005));
    }

    #[tokio::test]
    async fn test_static_resources_read_and_watch() {
        let resources = StaticResources::new().with_resource(
            Resource::new("mem:doc", "doc"),
            vec![ResourceContent::text("mem:doc", "text/plain", "body")],
        );

        let contents = resources.read("mem:doc").await.unwrap();
        assert_eq!(contents[0].text.as_deref(), Some("body"));
        assert!(resources.read("mem:other").await.is_err());

        let (sink, mut streams) = event_bus();
        resources
            .subscribe("mem:doc", sink.resource_updated.clone())
            .await
            .unwrap();
        resources.notify_updated("mem:doc").await.unwrap();
        let update = streams.resource_updated.recv().await.unwrap();
        assert_eq!(update.uri, "mem:doc");

        resources.unsubscribe("mem:doc").await.unwrap();
        assert!(resources.unsubscribe("mem:doc").await.is_err());
    }

    #[tokio::test]
    async fn test_static_prompts_get() {
        let prompts = StaticPrompts::new().with_prompt(
            Prompt::new("greet", "greets the user"),
            vec![PromptMessage::new(
                crate::protocol::sampling::Role::User,
                Content::text("hello"),
            )],
        );
        let (description, messages) = prompts.get("greet", HashMap::new()).await.unwrap();
        assert_eq!(description.as_deref(), Some("greets the user"));
        assert_eq!(messages.len(), 1);

        let err = prompts.get("missing", HashMap::new()).await.unwrap_err();
        assert_eq!(err.code(), Some(-32006));
    }
}
