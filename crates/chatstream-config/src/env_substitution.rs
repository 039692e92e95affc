use chatstream_core::{ChatError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;
use std::env;

// Supports both ${VAR} and ${VAR:-default}
static ENV_VAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("Invalid regex pattern")
});

/// Recursively substitute environment variables in every string of a YAML document
pub fn substitute_env_vars(value: &mut Value) -> Result<()> {
    let mut missing = Vec::new();
    substitute_value(value, &mut missing);

    if !missing.is_empty() {
        missing.sort();
        missing.dedup();
        return Err(ChatError::ConfigError(format!(
            "Missing required environment variables: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

fn substitute_value(value: &mut Value, missing: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            *s = substitute_in_string(s, missing);
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, missing);
            }
        }
        Value::Sequence(seq) => {
            for v in seq.iter_mut() {
                substitute_value(v, missing);
            }
        }
        Value::Tagged(tagged) => substitute_value(&mut tagged.value, missing),
        _ => {}
    }
}

fn substitute_in_string(input: &str, missing: &mut Vec<String>) -> String {
    ENV_VAR_REGEX
        .replace_all(input, |cap: &regex::Captures| {
            let var_name = &cap[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => match cap.get(2) {
                    Some(default) => default.as_str().to_string(),
                    None => {
                        missing.push(var_name.to_string());
                        String::new()
                    }
                },
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("CHATSTREAM_TEST_KEY", "sk-test");

        let mut value: Value = serde_yaml::from_str(
            r#"
provider:
  api_key: "${CHATSTREAM_TEST_KEY}"
  base_url: "${CHATSTREAM_NO_SUCH_URL:-http://localhost:8080}/v1"
chat:
  stop: ["${CHATSTREAM_TEST_KEY}"]
"#,
        )
        .unwrap();

        substitute_env_vars(&mut value).unwrap();

        assert_eq!(value["provider"]["api_key"], Value::from("sk-test"));
        assert_eq!(value["provider"]["base_url"], Value::from("http://localhost:8080/v1"));
        assert_eq!(value["chat"]["stop"][0], Value::from("sk-test"));

        env::remove_var("CHATSTREAM_TEST_KEY");
    }

    #[test]
    fn test_missing_variable_reported() {
        let mut value = Value::from("${CHATSTREAM_DEFINITELY_UNSET}");
        let err = substitute_env_vars(&mut value).unwrap_err();
        assert!(err.to_string().contains("CHATSTREAM_DEFINITELY_UNSET"));
    }
}
