use regex::{Regex, Captures};
use std::env;
use lazy_static::lazy_static;

use crate::config::Target;

lazy_static! {
    static ref ENV_VAR_REGEX: Regex = Regex::new(r"\$\{([^}]+)\}").unwrap();
}

/// Replaces every `${VAR}` in `input` with the value of the environment
/// variable `VAR`. Unset variables are left untouched.
pub fn interpolate_string(input: &str) -> String {
    ENV_VAR_REGEX.replace_all(input, |caps: &Captures| {
        match env::var(&caps[1]) {
            Ok(val) => val,
            Err(_) => {
                log::warn!("Environment variable {} not found; leaving placeholder in place.", &caps[1]);
                caps[0].to_string()
            }
        }
    }).to_string()
}

pub fn interpolate_targets(targets: &mut [Target]) {
    for target in targets.iter_mut() {
        target.url = interpolate_string(&target.url);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_yaml;
    use crate::config::TargetFile;

    fn load_test_targets() -> TargetFile {
        let yaml = r##"
targets:
  - url: "${LATENCYSCOPE_TEST_HOST}/health"
    color: "#009600"
  - url: "http://${LATENCYSCOPE_TEST_MISSING}"
    color: "#0000fa"
"##;
        serde_yaml::from_str::<TargetFile>(yaml).expect("Failed to parse YAML")
    }

    #[test]
    fn test_interpolation_for_target_urls() {
        env::set_var("LATENCYSCOPE_TEST_HOST", "https://status.example.test");

        let mut file = load_test_targets();
        interpolate_targets(&mut file.targets);

        assert_eq!(file.targets[0].url, "https://status.example.test/health");
        assert_eq!(file.targets[1].url, "http://${LATENCYSCOPE_TEST_MISSING}");

        env::remove_var("LATENCYSCOPE_TEST_HOST");
    }

    #[test]
    fn test_string_without_placeholders_is_unchanged() {
        assert_eq!(interpolate_string("http://google.com"), "http://google.com");
    }
}
