use serde::Deserialize;
use serde_json::Value;

/// GenerateContentResponse 顶层结构（非流式与流式 chunk 共用）
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiGenerateContentResponse {
    /// 候选回答列表
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    /// token 用量元信息
    #[serde(default, rename = "usageMetadata")]
    pub(crate) usage_metadata: Option<GeminiUsageMetadata>,
    /// 流中偶尔出现的内联错误
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorDetail>,
}

/// 单个候选回答
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
    #[serde(default, rename = "finishReason")]
    pub(crate) finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
}

/// Content.part
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default)]
    pub(crate) text: Option<String>,
    /// 思考摘要，不进入规范化文本
    #[serde(default)]
    pub(crate) thought: Option<bool>,
    #[serde(default, rename = "functionCall", alias = "function_call")]
    pub(crate) function_call: Option<GeminiFunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiFunctionCall {
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) args: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiUsageMetadata {
    #[serde(default, rename = "promptTokenCount")]
    pub(crate) prompt_token_count: Option<u64>,
    #[serde(default, rename = "candidatesTokenCount")]
    pub(crate) candidates_token_count: Option<u64>,
    #[serde(default, rename = "totalTokenCount")]
    pub(crate) total_token_count: Option<u64>,
}

/// `error` object of the Google RPC envelope.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    #[serde(default)]
    pub(crate) code: Option<i64>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl GeminiPart {
    /// Visible text of the part; thought summaries yield nothing.
    pub(crate) fn visible_text(&self) -> Option<&str> {
        if self.thought.unwrap_or(false) {
            return None;
        }
        self.text.as_deref()
    }
}

impl GeminiFunctionCall {
    /// Arguments as a JSON object string, `{}` when the vendor sent none.
    pub(crate) fn arguments(&self) -> String {
        match &self.args {
            Some(Value::Null) | None => "{}".to_string(),
            Some(args) => args.to_string(),
        }
    }
}
