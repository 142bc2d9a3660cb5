use serde::{Deserialize, Serialize};

use crate::llm::ChatError;

/// Sampling settings sent as the `parameters` object of a generation call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GenerationParameters {
    pub temperature: f64,
    /// Maximum number of input tokens kept by the server.
    pub truncate: u32,
    pub max_new_tokens: u32,
    pub stop: Vec<String>,
    pub top_p: f64,
    pub repetition_penalty: f64,
    pub top_k: u32,
    pub return_full_text: bool,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            truncate: 1000,
            max_new_tokens: 1024,
            stop: vec!["</s>".to_string()],
            top_p: 0.95,
            repetition_penalty: 1.2,
            top_k: 50,
            return_full_text: false,
        }
    }
}

impl GenerationParameters {
    /// Applies `overrides` on top of `self`; every field set in `overrides` wins.
    pub fn merged(mut self, overrides: &ParamOverrides) -> Self {
        if let Some(v) = overrides.temperature {
            self.temperature = v;
        }
        if let Some(v) = overrides.truncate {
            self.truncate = v;
        }
        if let Some(v) = overrides.max_new_tokens {
            self.max_new_tokens = v;
        }
        if let Some(v) = &overrides.stop {
            self.stop = v.clone();
        }
        if let Some(v) = overrides.top_p {
            self.top_p = v;
        }
        if let Some(v) = overrides.repetition_penalty {
            self.repetition_penalty = v;
        }
        if let Some(v) = overrides.top_k {
            self.top_k = v;
        }
        if let Some(v) = overrides.return_full_text {
            self.return_full_text = v;
        }
        self
    }
}

/// Caller-supplied parameter overrides. Unknown keys are rejected, both when
/// set by name and when read from a config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ParamOverrides {
    pub temperature: Option<f64>,
    pub truncate: Option<u32>,
    pub max_new_tokens: Option<u32>,
    pub stop: Option<Vec<String>>,
    pub top_p: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub top_k: Option<u32>,
    pub return_full_text: Option<bool>,
}

impl ParamOverrides {
    pub const KEYS: [&'static str; 8] = [
        "temperature",
        "truncate",
        "max_new_tokens",
        "stop",
        "top_p",
        "repetition_penalty",
        "top_k",
        "return_full_text",
    ];

    /// Sets one override from its textual form. `stop` takes a comma
    /// separated list.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ChatError> {
        let value = value.trim();
        match key {
            "temperature" => self.temperature = Some(parse(key, value)?),
            "truncate" => self.truncate = Some(parse(key, value)?),
            "max_new_tokens" => self.max_new_tokens = Some(parse(key, value)?),
            "stop" => {
                let mut stops: Vec<String> = Vec::new();
                for s in value.split(',').filter(|s| !s.is_empty()) {
                    if !stops.iter().any(|x| x == s) {
                        stops.push(s.to_string());
                    }
                }
                self.stop = Some(stops);
            }
            "top_p" => self.top_p = Some(parse(key, value)?),
            "repetition_penalty" => self.repetition_penalty = Some(parse(key, value)?),
            "top_k" => self.top_k = Some(parse(key, value)?),
            "return_full_text" => self.return_full_text = Some(parse(key, value)?),
            other => {
                return Err(ChatError::InvalidParameter(format!(
                    "unknown parameter '{}' (expected one of: {})",
                    other,
                    Self::KEYS.join(", ")
                )))
            }
        }
        Ok(())
    }

    /// Parses a `key=value` pair.
    pub fn set_pair(&mut self, pair: &str) -> Result<(), ChatError> {
        let (k, v) = pair.split_once('=').ok_or_else(|| {
            ChatError::InvalidParameter(format!("expected KEY=VALUE, got '{}'", pair))
        })?;
        self.set(k.trim(), v)
    }

    /// Layers `other` over `self`; fields set in `other` win.
    pub fn overlay(&self, other: &ParamOverrides) -> ParamOverrides {
        ParamOverrides {
            temperature: other.temperature.or(self.temperature),
            truncate: other.truncate.or(self.truncate),
            max_new_tokens: other.max_new_tokens.or(self.max_new_tokens),
            stop: other.stop.clone().or_else(|| self.stop.clone()),
            top_p: other.top_p.or(self.top_p),
            repetition_penalty: other.repetition_penalty.or(self.repetition_penalty),
            top_k: other.top_k.or(self.top_k),
            return_full_text: other.return_full_text.or(self.return_full_text),
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ChatError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ChatError::InvalidParameter(format!("{}='{}': {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_serialize_as_expected() {
        let v = serde_json::to_value(GenerationParameters::default()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "temperature": 0.2,
                "truncate": 1000,
                "max_new_tokens": 1024,
                "stop": ["</s>"],
                "top_p": 0.95,
                "repetition_penalty": 1.2,
                "top_k": 50,
                "return_full_text": false
            })
        );
    }

    #[test]
    fn caller_overrides_win() {
        let mut o = ParamOverrides::default();
        o.set("temperature", "0.7").unwrap();
        o.set("max_new_tokens", "64").unwrap();
        let p = GenerationParameters::default().merged(&o);
        assert_eq!(p.temperature, 0.7);
        assert_eq!(p.max_new_tokens, 64);
        assert_eq!(p.top_k, 50);
        assert_eq!(p.stop, vec!["</s>".to_string()]);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut o = ParamOverrides::default();
        let err = o.set("typical_p", "0.5").unwrap_err();
        assert!(matches!(err, ChatError::InvalidParameter(m) if m.contains("typical_p")));
    }

    #[test]
    fn bad_value_is_rejected() {
        let mut o = ParamOverrides::default();
        assert!(o.set("top_k", "many").is_err());
        assert!(o.set_pair("top_k").is_err());
        assert_eq!(o, ParamOverrides::default());
    }

    #[test]
    fn stop_list_is_deduplicated() {
        let mut o = ParamOverrides::default();
        o.set_pair("stop=</s>,User:,</s>").unwrap();
        assert_eq!(o.stop, Some(vec!["</s>".to_string(), "User:".to_string()]));
    }

    #[test]
    fn overlay_prefers_later_layer() {
        let file = ParamOverrides {
            temperature: Some(0.5),
            top_k: Some(10),
            ..Default::default()
        };
        let request = ParamOverrides {
            temperature: Some(0.9),
            ..Default::default()
        };
        let o = file.overlay(&request);
        assert_eq!(o.temperature, Some(0.9));
        assert_eq!(o.top_k, Some(10));
    }

    #[test]
    fn deserialize_rejects_unknown_fields() {
        let r: Result<ParamOverrides, _> = serde_json::from_str(r#"{"seed": 1}"#);
        assert!(r.is_err());
    }
}
