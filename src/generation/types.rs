//! Tipos de dados para as requisições e respostas do serviço de geração.
//!
//! [`CompletionRequest`] e [`ImageRequest`] descrevem uma chamada do ponto de
//! vista do pipeline; as demais structs seguem o formato JSON dos endpoints
//! `chat/completions` e `images/generations` compatíveis com OpenAI.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parâmetros de uma chamada de geração de texto.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Parâmetros de uma chamada de geração de imagem.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    /// Dimensões no formato `LARGURAxALTURA`, ex.: "1728x2304".
    pub size: String,
    pub timeout: Duration,
    pub no_watermark: bool,
}

/// Corpo da requisição para `POST {base}/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Uma única mensagem da conversa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Papel do remetente: "user", "assistant" ou "system".
    pub role: String,
    pub content: String,
}

/// Resposta de `chat/completions`; apenas os campos usados pelo pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

/// Corpo da requisição para `POST {base}/images/generations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationBody {
    pub model: String,
    pub prompt: String,
    pub response_format: String,
    pub size: String,
    pub watermark: bool,
}

/// Resposta de `images/generations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationResponse {
    pub data: Vec<GeneratedImage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImage {
    /// URL temporária da imagem gerada. Ausente quando o formato pedido não é "url".
    #[serde(default)]
    pub url: Option<String>,
}
