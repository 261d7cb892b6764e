//! Configuração do notepress carregada a partir de `notepress.toml`.
//!
//! A struct [`NotepressConfig`] é montada uma única vez no início do processo
//! e passada por referência para o construtor de cada componente. Valores não
//! presentes no arquivo usam defaults sensíveis. As variáveis de ambiente
//! `NOTEPRESS_API_KEY`, `NOTEPRESS_IMAGE_API_KEY` e `NOTEPRESS_RELAY_URL`
//! têm precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::publish::ChannelKind;

/// Nome do arquivo procurado no diretório atual quando `--config` não é usado.
pub const DEFAULT_CONFIG_FILE: &str = "notepress.toml";

/// Configuração de nível superior carregada de `notepress.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotepressConfig {
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub images: ImageConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Parâmetros do serviço de geração de texto e imagem.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Chave da API de geração de texto.
    pub api_key: String,
    /// Chave da API de imagens; vazia significa reutilizar `api_key`.
    pub image_api_key: String,
    pub base_url: String,
    pub text_model: String,
    pub image_model: String,
    pub temperature: f32,
    /// Temperatura mais alta usada na etapa de humanização.
    pub humanize_temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    /// Executa a etapa opcional de humanização do texto.
    pub humanize: bool,
    /// Número de palavras usado quando a CLI não informa outro.
    pub default_word_count: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            image_api_key: String::new(),
            base_url: "https://ark.cn-beijing.volces.com/api/v3".to_string(),
            text_model: "doubao-seed-1-8-251228".to_string(),
            image_model: "doubao-seedream-4-5-251128".to_string(),
            temperature: 0.7,
            humanize_temperature: 0.95,
            max_tokens: 2000,
            timeout_secs: 60,
            humanize: true,
            default_word_count: 600,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Chave efetiva para geração de imagens.
    pub fn image_key(&self) -> &str {
        if self.image_api_key.is_empty() {
            &self.api_key
        } else {
            &self.image_api_key
        }
    }
}

/// Parâmetros da etapa de imagens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Total de imagens por nota (capa + conteúdo), entre 1 e 4.
    pub count: usize,
    /// Tamanho fixo pedido ao gerador (proporção 3:4).
    pub size: String,
    pub download_timeout_secs: u64,
    /// Arquivos com até este número de bytes são tratados como corrompidos.
    pub min_bytes: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            count: 3,
            size: "1728x2304".to_string(),
            download_timeout_secs: 30,
            min_bytes: 1024,
        }
    }
}

impl ImageConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

/// Seleção do canal de publicação.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub channel: ChannelKind,
}

/// Parâmetros do canal de relay remoto (JSON-RPC via HTTP).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
    /// Nome da ferramenta chamada em `tools/call`.
    pub tool: String,
    /// Total de tentativas para falhas transitórias.
    pub max_attempts: u32,
    /// Atraso base em milissegundos para backoff exponencial.
    pub base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            tool: "publish_content".to_string(),
            max_attempts: 3,
            base_delay_ms: 1000,
            timeout_secs: 30,
        }
    }
}

/// Parâmetros do canal de automação de navegador.
///
/// Localizadores com prefixo `xpath:` são tratados como XPath; os demais como
/// seletores CSS. A ordem das listas define a prioridade das tentativas.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub publish_url: String,
    pub headless: bool,
    pub login_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub progress_interval_secs: u64,
    /// Tempo em que a sessão fica aberta para confirmação manual.
    pub dwell_secs: u64,
    pub login_indicators: Vec<String>,
    pub upload_locators: Vec<String>,
    pub title_locators: Vec<String>,
    pub content_locators: Vec<String>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            publish_url: String::new(),
            headless: false,
            login_timeout_secs: 120,
            poll_interval_ms: 1000,
            progress_interval_secs: 10,
            dwell_secs: 30,
            login_indicators: strings(&[
                ".login-container",
                ".qrcode-img",
                "input[type=\"password\"]",
                "xpath://button[contains(., 'Log in')]",
            ]),
            upload_locators: strings(&[
                "input[type=\"file\"]",
                ".upload-input",
                "input[accept*=\"image\"]",
            ]),
            title_locators: strings(&[
                "input[placeholder*=\"title\" i]",
                ".title-input input",
                "#title",
            ]),
            content_locators: strings(&[
                "div[contenteditable=\"true\"]",
                ".ql-editor",
                "textarea",
            ]),
        }
    }
}

impl BrowserConfig {
    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs)
    }

    pub fn dwell(&self) -> Duration {
        Duration::from_secs(self.dwell_secs)
    }
}

/// Diretórios de saída e retenção do histórico.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub output_dir: PathBuf,
    pub preview_dir: PathBuf,
    /// Caminho do histórico; por padrão `<output_dir>/history.json`.
    pub history_file: Option<PathBuf>,
    pub retention_days: u32,
    /// Grava também os logs em `<output_dir>/app.log`.
    pub log_to_file: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./output"),
            preview_dir: PathBuf::from("./preview"),
            history_file: None,
            retention_days: 30,
            log_to_file: true,
        }
    }
}

impl StorageConfig {
    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| self.output_dir.join("history.json"))
    }

    /// Arquivo de log persistente, ou `None` quando desativado.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.log_to_file.then(|| self.output_dir.join("app.log"))
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl NotepressConfig {
    /// Carrega a configuração de `path` ou de `notepress.toml` no diretório atual.
    ///
    /// Um caminho explícito inexistente é erro; o arquivo padrão ausente
    /// resulta nos valores padrão.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config = toml::from_str::<NotepressConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Aplica as variáveis de ambiente sobre os valores do arquivo.
    /// Valores vazios são ignorados.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = get("NOTEPRESS_API_KEY") {
            self.generation.api_key = key;
        }
        if let Some(key) = get("NOTEPRESS_IMAGE_API_KEY") {
            self.generation.image_api_key = key;
        }
        if let Some(url) = get("NOTEPRESS_RELAY_URL") {
            self.relay.url = url;
        }
    }

    /// Verifica se a configuração é suficiente para uma execução do pipeline
    /// e cria os diretórios de saída.
    pub fn validate(&self) -> Result<()> {
        if self.generation.api_key.is_empty() {
            bail!("generation API key is required (set NOTEPRESS_API_KEY or generation.api_key)");
        }
        if !(1..=4).contains(&self.images.count) {
            bail!("images.count must be between 1 and 4, got {}", self.images.count);
        }
        match self.publish.channel {
            ChannelKind::Simulated => {}
            ChannelKind::Relay if self.relay.url.is_empty() => {
                bail!("relay channel selected but relay.url is empty");
            }
            ChannelKind::Relay => {}
            ChannelKind::Browser if self.browser.publish_url.is_empty() => {
                bail!("browser channel selected but browser.publish_url is empty");
            }
            ChannelKind::Browser => {}
        }

        std::fs::create_dir_all(&self.storage.output_dir).with_context(|| {
            format!("failed to create {}", self.storage.output_dir.display())
        })?;
        std::fs::create_dir_all(&self.storage.preview_dir).with_context(|| {
            format!("failed to create {}", self.storage.preview_dir.display())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = NotepressConfig::default();
        assert_eq!(config.generation.text_model, "doubao-seed-1-8-251228");
        assert_eq!(config.generation.default_word_count, 600);
        assert_eq!(config.images.count, 3);
        assert_eq!(config.images.size, "1728x2304");
        assert_eq!(config.relay.max_attempts, 3);
        assert_eq!(config.relay.base_delay_ms, 1000);
        assert_eq!(config.browser.login_timeout_secs, 120);
        assert_eq!(config.browser.dwell_secs, 30);
        assert_eq!(config.publish.channel, ChannelKind::Simulated);
        assert!(config.generation.api_key.is_empty());
    }

    #[test]
    fn log_file_lives_in_output_dir() {
        let mut storage = StorageConfig {
            output_dir: PathBuf::from("/tmp/np-out"),
            ..Default::default()
        };
        assert_eq!(storage.log_path(), Some(PathBuf::from("/tmp/np-out/app.log")));
        storage.log_to_file = false;
        assert_eq!(storage.log_path(), None);
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [generation]
            api_key = "sk-test-123"
            humanize = false

            [publish]
            channel = "relay"

            [relay]
            url = "http://localhost:18060/mcp"
            max_attempts = 5
        "#;
        let config: NotepressConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generation.api_key, "sk-test-123");
        assert!(!config.generation.humanize);
        assert_eq!(config.generation.temperature, 0.7);
        assert_eq!(config.publish.channel, ChannelKind::Relay);
        assert_eq!(config.relay.max_attempts, 5);
        assert_eq!(config.relay.tool, "publish_content");
        assert_eq!(config.storage.retention_days, 30);
    }

    #[test]
    fn history_path_defaults_to_output_dir() {
        let storage = StorageConfig::default();
        assert_eq!(storage.history_path(), PathBuf::from("./output/history.json"));

        let storage = StorageConfig {
            history_file: Some(PathBuf::from("/var/lib/notepress/h.json")),
            ..Default::default()
        };
        assert_eq!(storage.history_path(), PathBuf::from("/var/lib/notepress/h.json"));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = NotepressConfig::default();
        config.generation.api_key = "from-file".into();
        config.apply_overrides(|key| match key {
            "NOTEPRESS_API_KEY" => Some("from-env".into()),
            "NOTEPRESS_RELAY_URL" => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.generation.api_key, "from-env");
        assert!(config.relay.url.is_empty());
    }

    #[test]
    fn image_key_falls_back_to_text_key() {
        let mut generation = GenerationConfig {
            api_key: "text".into(),
            ..Default::default()
        };
        assert_eq!(generation.image_key(), "text");
        generation.image_api_key = "image".into();
        assert_eq!(generation.image_key(), "image");
    }

    #[test]
    fn validate_requires_channel_endpoints() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = NotepressConfig::default();
        config.generation.api_key = "key".into();
        config.storage.output_dir = tmp.path().join("out");
        config.storage.preview_dir = tmp.path().join("preview");

        config.publish.channel = ChannelKind::Relay;
        assert!(config.validate().is_err());

        config.relay.url = "http://localhost:1/mcp".into();
        config.validate().unwrap();
        assert!(tmp.path().join("out").is_dir());
        assert!(tmp.path().join("preview").is_dir());

        config.publish.channel = ChannelKind::Browser;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        let result = NotepressConfig::load(Some(Path::new("/definitely/not/here.toml")));
        assert!(result.is_err());
    }
}
