//! The generation controller: drives model calls through extraction and
//! recovers from validation and assertion failures.
//!
//! Two nested bounded loops: an outer *step* loop for tool-call rounds and
//! an inner *retry* loop for validation/assertion fix-ups within a step.
//! Recoverable failures become corrective conversation turns; everything
//! else aborts immediately.

use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::chat::{
    merge_function_calls, merge_model_configs, ChatFeed, ChatRequest, ChatResponse, ChatService,
    ChunkStream, FinishReason, FunctionCall, InMemory, Memory, ModelUsage, Turn, UsageReport,
};
use crate::errors::{AttemptError, GenerateError, ValidationError};
use crate::observability::GenerateSpanAttributes;
use crate::extract::{
    extract_values, stream_values, streaming_extract_final_value, streaming_extract_values,
    DeltaStream, ExtractOptions, ExtractionState, GenDelta,
};
use crate::prompt::PromptTemplate;
use crate::signature::Signature;
use crate::tools::{process_calls, ToolRegistry};
use crate::values::ValueMap;

use super::asserts::{check_assertions, check_streaming_assertions, Assertion, StreamingAssertion};
use super::options::{ForwardOptions, GenOptions};

type DeltaSender = mpsc::UnboundedSender<Result<GenDelta, GenerateError>>;

/// Generates typed values for one signature, retrying until extraction and
/// assertions succeed or the budgets run out.
///
/// A generator is immutable during generation and may serve concurrent
/// `forward` calls; each call owns its own conversation memory and
/// extraction state.
pub struct Generator {
    id: Uuid,
    signature: Arc<Signature>,
    prompt: PromptTemplate,
    options: GenOptions,
    asserts: Vec<Assertion>,
    streaming_asserts: Vec<StreamingAssertion>,
    tools: Option<Arc<ToolRegistry>>,
    examples: Vec<ValueMap>,
    demos: Vec<ValueMap>,
    usage: Mutex<Vec<UsageReport>>,
    trace: Mutex<Option<ValueMap>>,
}

impl Generator {
    /// Creates a generator with default options.
    #[must_use]
    pub fn new(signature: Signature) -> Self {
        Self::with_options(signature, GenOptions::default())
    }

    /// Creates a generator with explicit options.
    #[must_use]
    pub fn with_options(signature: Signature, options: GenOptions) -> Self {
        let signature = Arc::new(signature);
        Self {
            id: Uuid::new_v4(),
            prompt: PromptTemplate::new(Arc::clone(&signature)),
            signature,
            options,
            asserts: Vec::new(),
            streaming_asserts: Vec::new(),
            tools: None,
            examples: Vec::new(),
            demos: Vec::new(),
            usage: Mutex::new(Vec::new()),
            trace: Mutex::new(None),
        }
    }

    /// Creates a generator from a signature DSL string.
    pub fn parse(dsl: &str) -> Result<Self, GenerateError> {
        Ok(Self::new(Signature::parse(dsl)?))
    }

    /// Attaches the tool registry made visible to the model.
    #[must_use]
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Adds an assertion over partial and final values.
    pub fn add_assert(&mut self, assertion: Assertion) {
        self.asserts.push(assertion);
    }

    /// Adds a streaming assertion over one field's partial text.
    pub fn add_streaming_assert(&mut self, assertion: StreamingAssertion) {
        self.streaming_asserts.push(assertion);
    }

    /// Sets worked examples rendered into the prompt.
    pub fn set_examples(&mut self, examples: Vec<ValueMap>) {
        self.examples = examples;
    }

    /// Sets demos rendered into the prompt.
    pub fn set_demos(&mut self, demos: Vec<ValueMap>) {
        self.demos = demos;
    }

    /// The generator's identity, used in traces.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The signature this generator produces values for.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Usage reports accumulated across calls.
    #[must_use]
    pub fn usage(&self) -> Vec<UsageReport> {
        self.usage.lock().clone()
    }

    /// Clears accumulated usage reports.
    pub fn reset_usage(&self) {
        self.usage.lock().clear();
    }

    /// The last successful inputs-plus-outputs record, for example
    /// collection.
    #[must_use]
    pub fn last_trace(&self) -> Option<ValueMap> {
        self.trace.lock().clone()
    }

    /// Runs one generation to completion and returns the values map.
    pub async fn forward(
        &self,
        service: &dyn ChatService,
        inputs: ValueMap,
        options: &ForwardOptions,
    ) -> Result<ValueMap, GenerateError> {
        let span = info_span!("generate", id = %self.id, signature = %self.signature);
        self.drive(service, inputs, options, None).instrument(span).await
    }

    /// Runs one generation, emitting partial-value deltas as they become
    /// available. The returned stream ends with the generation; a terminal
    /// error is delivered through the stream.
    #[must_use]
    pub fn streaming_forward(
        self: Arc<Self>,
        service: Arc<dyn ChatService>,
        inputs: ValueMap,
        options: ForwardOptions,
    ) -> DeltaStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let generator = self;
        let span = info_span!("generate", id = %generator.id, signature = %generator.signature);
        tokio::spawn(
            async move {
                let result = generator
                    .drive(service.as_ref(), inputs, &options, Some(&sender))
                    .await;
                if let Err(error) = result {
                    let _ = sender.send(Err(error));
                }
            }
            .instrument(span),
        );
        DeltaStream::new(receiver)
    }

    async fn drive(
        &self,
        service: &dyn ChatService,
        inputs: ValueMap,
        options: &ForwardOptions,
        sink: Option<&DeltaSender>,
    ) -> Result<ValueMap, GenerateError> {
        let max_steps = options.max_steps.unwrap_or(self.options.max_steps);
        let max_retries = options.max_retries.unwrap_or(self.options.max_retries);
        let strict = options.strict.unwrap_or(self.options.strict);
        let stream_pref = options.stream.unwrap_or(self.options.stream);
        let stream = stream_pref && service.features().streaming;
        let stop_tool = options
            .stop_tool
            .clone()
            .or_else(|| self.options.stop_tool.clone())
            .map(|name| name.to_lowercase());

        let call_config = options.model_config.clone().unwrap_or_default();
        let config = merge_model_configs(
            &merge_model_configs(&service.default_config(), &self.options.model_config),
            &call_config,
        );

        let memory: Arc<dyn Memory> = options
            .memory
            .clone()
            .unwrap_or_else(|| Arc::new(InMemory::new()));

        let tool_names: Vec<String> = self
            .tools
            .as_ref()
            .map(|tools| tools.specs().into_iter().map(|spec| spec.name).collect())
            .unwrap_or_default();
        let attributes = GenerateSpanAttributes::new(self.signature.to_string())
            .with_tools(tool_names)
            .to_attributes();
        debug!(?attributes, max_steps, max_retries, stream, "starting generation");

        let prompt_turn = self
            .prompt
            .render(&inputs, &self.examples, &self.demos)
            .map_err(GenerateError::Validation)?;
        memory.add(prompt_turn);

        let mut executed: HashSet<String> = HashSet::new();

        'steps: for step in 0..max_steps {
            let mut last_recoverable: Option<AttemptError> = None;

            for retry in 0..max_retries {
                let attempt = self
                    .run_attempt(service, memory.as_ref(), &config, stream, strict, &mut executed, sink)
                    .await;

                match attempt {
                    Ok(values) => {
                        let last_is_function =
                            matches!(memory.get_last(), Some(Turn::Function { .. }));
                        let stop_fired = stop_tool
                            .as_deref()
                            .is_some_and(|name| executed.contains(name));

                        if last_is_function && !stop_fired {
                            debug!(step, "tool round complete, continuing");
                            continue 'steps;
                        }

                        if !stop_fired {
                            if let Err(error) = check_required_output_fields(&self.signature, &values)
                            {
                                debug!(step, retry, error = %error, "required fields missing, retrying");
                                let corrective =
                                    self.prompt.render_corrections(&error.fixing_instructions());
                                memory.add(corrective);
                                last_recoverable = Some(AttemptError::Validation(error));
                                continue;
                            }
                        }

                        let mut values = values;
                        for field in self.signature.output_fields() {
                            if field.is_internal {
                                values.remove(&field.name);
                            }
                        }

                        let mut record = inputs.clone();
                        record.extend(values.clone());
                        *self.trace.lock() = Some(record);

                        return Ok(values);
                    }
                    Err(AttemptError::Fatal(error)) => return Err(error),
                    Err(recoverable) => {
                        let instructions = recoverable.fixing_instructions().unwrap_or_default();
                        debug!(
                            step,
                            retry,
                            error = %recoverable.message(),
                            "appending corrective instructions"
                        );
                        memory.add(self.prompt.render_corrections(&instructions));
                        last_recoverable = Some(recoverable);
                    }
                }
            }

            // Retry budget exhausted within this step.
            if let Some(AttemptError::Assertion(assertion)) = &last_recoverable {
                if assertion.optional {
                    return Ok(assertion.values.clone());
                }
            }
            let last_error = last_recoverable
                .map(|error| error.message())
                .unwrap_or_else(|| "no recoverable failure recorded".to_string());
            return Err(GenerateError::RetriesExhausted {
                retries: max_retries,
                last_error,
            });
        }

        Err(GenerateError::MaxStepsReached(max_steps))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        service: &dyn ChatService,
        memory: &dyn Memory,
        config: &crate::chat::ModelConfig,
        stream: bool,
        strict: bool,
        executed: &mut HashSet<String>,
        sink: Option<&DeltaSender>,
    ) -> Result<ValueMap, AttemptError> {
        let turns = memory.history();
        if turns.is_empty() {
            return Err(AttemptError::Fatal(GenerateError::EmptyPrompt));
        }

        let tools = self.tools.as_ref().map(|t| t.specs()).unwrap_or_default();
        let request = ChatRequest {
            turns,
            tools,
            config: config.clone(),
            stream,
        };

        let feed = service.chat(request).await.map_err(AttemptError::Fatal)?;
        match feed {
            ChatFeed::Complete(response) => {
                self.process_response(service, response, memory, strict, executed).await
            }
            ChatFeed::Incremental(chunks) => {
                self.process_chunk_stream(service, chunks, memory, strict, executed, sink)
                    .await
            }
        }
    }

    /// Handles one buffered response: extract once over the complete text,
    /// execute any tool calls, check assertions.
    async fn process_response(
        &self,
        service: &dyn ChatService,
        response: ChatResponse,
        memory: &dyn Memory,
        strict: bool,
        executed: &mut HashSet<String>,
    ) -> Result<ValueMap, AttemptError> {
        let mut values = ValueMap::new();

        if let Some(usage) = &response.usage {
            self.record_usage(service, *usage);
        }

        for result in &response.results {
            memory.add_result(Turn::Assistant {
                content: result.content.clone(),
                function_calls: result.function_calls.clone(),
            });

            if let Some(content) = &result.content {
                extract_values(&self.signature, &mut values, content, strict)
                    .map_err(AttemptError::Validation)?;
                check_assertions(&self.asserts, &values).map_err(AttemptError::Assertion)?;
            }

            if !result.function_calls.is_empty() {
                let Some(registry) = &self.tools else {
                    return Err(AttemptError::Fatal(GenerateError::ToolsNotDefined));
                };
                let ran = process_calls(registry, &result.function_calls, memory).await;
                executed.extend(ran);
            }

            if result.finish_reason == Some(FinishReason::Length) {
                return Err(AttemptError::Fatal(GenerateError::Truncated));
            }
        }

        Ok(values)
    }

    /// Handles one incremental response: advance extraction as each chunk
    /// lands, check assertions against partial values, emit deltas, and
    /// finalize at end of stream.
    async fn process_chunk_stream(
        &self,
        service: &dyn ChatService,
        mut chunks: ChunkStream,
        memory: &dyn Memory,
        strict: bool,
        executed: &mut HashSet<String>,
        sink: Option<&DeltaSender>,
    ) -> Result<ValueMap, AttemptError> {
        let mut values = ValueMap::new();
        let mut state = ExtractionState::new();
        let mut content = String::new();
        let mut calls: Vec<FunctionCall> = Vec::new();
        let mut last_index = 0;
        let extract_options = ExtractOptions { strict };

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(AttemptError::Fatal)?;

            if let Some(usage) = &chunk.usage {
                self.record_usage(service, *usage);
            }

            for result in &chunk.results {
                last_index = result.index;

                if let Some(delta_text) = &result.content {
                    content.push_str(delta_text);
                    memory.update_result(Turn::Assistant {
                        content: Some(content.clone()),
                        function_calls: calls.clone(),
                    });

                    check_streaming_assertions(
                        &self.streaming_asserts,
                        &self.signature,
                        &state,
                        &content,
                        &values,
                    )
                    .map_err(AttemptError::Assertion)?;

                    streaming_extract_values(
                        &self.signature,
                        &mut values,
                        &mut state,
                        &content,
                        extract_options,
                    )
                    .map_err(AttemptError::Validation)?;

                    check_assertions(&self.asserts, &values).map_err(AttemptError::Assertion)?;

                    if let Some(sender) = sink {
                        for delta in
                            stream_values(&self.signature, &content, &values, &mut state, result.index)
                        {
                            let _ = sender.send(Ok(delta));
                        }
                    }
                }

                if !result.function_calls.is_empty() {
                    merge_function_calls(&mut calls, &result.function_calls);
                    memory.update_result(Turn::Assistant {
                        content: (!content.is_empty()).then(|| content.clone()),
                        function_calls: calls.clone(),
                    });
                }

                if result.finish_reason == Some(FinishReason::Length) {
                    return Err(AttemptError::Fatal(GenerateError::Truncated));
                }
            }
        }

        if !calls.is_empty() {
            let Some(registry) = &self.tools else {
                return Err(AttemptError::Fatal(GenerateError::ToolsNotDefined));
            };
            let ran = process_calls(registry, &calls, memory).await;
            executed.extend(ran);
        }

        streaming_extract_final_value(&self.signature, &mut values, &mut state, &content, strict)
            .map_err(AttemptError::Validation)?;
        check_assertions(&self.asserts, &values).map_err(AttemptError::Assertion)?;

        if let Some(sender) = sink {
            for delta in stream_values(&self.signature, &content, &values, &mut state, last_index) {
                let _ = sender.send(Ok(delta));
            }
        }

        Ok(values)
    }

    fn record_usage(&self, service: &dyn ChatService, usage: ModelUsage) {
        self.usage.lock().push(UsageReport {
            service: service.name().to_string(),
            model: service.model().to_string(),
            usage,
        });
    }
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("id", &self.id)
            .field("signature", &self.signature.to_string())
            .field("asserts", &self.asserts.len())
            .field("streaming_asserts", &self.streaming_asserts.len())
            .field("has_tools", &self.tools.is_some())
            .finish_non_exhaustive()
    }
}

/// Verifies that every required, non-internal output field is present.
///
/// Internal fields are checked during extraction finalization; by the time
/// this runs on a returned values map they may already be stripped.
fn check_required_output_fields(
    signature: &Signature,
    values: &ValueMap,
) -> Result<(), ValidationError> {
    let missing: Vec<_> = signature
        .output_fields()
        .iter()
        .filter(|field| !field.is_optional && !field.is_internal && !values.contains_key(&field.name))
        .map(crate::errors::FieldRef::from)
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        let message = if missing.len() == 1 {
            "Required field not found"
        } else {
            "Required fields not found"
        };
        Err(ValidationError::for_fields(missing, message))
    }
}
