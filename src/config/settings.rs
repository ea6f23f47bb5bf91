use serde::Deserialize;

/// Top-level configuration settings for the worker.
///
/// Every section falls back to its defaults field by field, so a config file
/// or environment only has to name the values it changes.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub inference: InferenceSettings,
    pub logging: LoggingSettings,
}

/// Connection and queue settings for the message broker.
#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub vhost: String,
    /// Durable work queue shared by every producer and worker instance.
    pub queue: String,
    pub consumer_tag: String,
    /// Wait for broker confirms on every reply so lost replies are reported.
    pub publisher_confirms: bool,
}

/// Settings for the hosted paraphrase model.
///
/// The generation parameters are forwarded verbatim to the model endpoint.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceSettings {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub prompt_prefix: String,
    pub num_return_sequences: u32,
    pub num_beams: u32,
    pub max_length: u32,
    pub do_sample: bool,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub no_repeat_ngram_size: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5672,
            username: "guest".to_string(),
            password: "guest".to_string(),
            vhost: "/".to_string(),
            queue: "caption-requests".to_string(),
            consumer_tag: "caption-worker".to_string(),
            publisher_confirms: true,
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8080/generate".to_string(),
            api_token: None,
            prompt_prefix: "Paraphrase: ".to_string(),
            num_return_sequences: 5,
            num_beams: 7,
            max_length: 50,
            do_sample: true,
            temperature: 0.9,
            top_k: 100,
            top_p: 0.95,
            no_repeat_ngram_size: 2,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl std::fmt::Debug for BrokerSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("vhost", &self.vhost)
            .field("queue", &self.queue)
            .field("consumer_tag", &self.consumer_tag)
            .field("publisher_confirms", &self.publisher_confirms)
            .finish()
    }
}
