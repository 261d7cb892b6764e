//! Tipos de erro para o cliente do serviço de geração.
//!
//! Define [`GenerationError`] com variantes para erros HTTP da API, timeouts,
//! falhas de rede e respostas sem o conteúdo esperado. Usa `thiserror` para
//! derivar `Display` e `Error` a partir dos atributos `#[error(...)]`.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar o serviço de geração de texto ou imagem.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// A API respondeu com status diferente de 2xx.
    /// Contém o código de status HTTP e o corpo da resposta.
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    /// A requisição excedeu o tempo limite configurado.
    #[error("request timed out")]
    Timeout,

    /// Falha de rede subjacente (DNS, conexão recusada, corpo truncado).
    #[error("network error: {0}")]
    NetworkError(#[source] reqwest::Error),

    /// A resposta foi recebida mas não trouxe texto ou URL utilizável.
    #[error("empty response: {0}")]
    EmptyResponse(&'static str),
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GenerationError::Timeout
        } else {
            GenerationError::NetworkError(err)
        }
    }
}
