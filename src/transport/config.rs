use super::{ConnectOptions, Engine};

pub fn parse_engine(s: &str) -> Option<Engine> {
    match s.to_lowercase().as_str() {
        "redis" | "redistimeseries" => Some(Engine::Redis),
        "mock" => Some(Engine::Mock),
        _ => None,
    }
}

/// Collects `key=value` pairs; entries without `=` are ignored.
pub fn parse_connect_kv(pairs: &[String]) -> ConnectOptions {
    let mut opts = ConnectOptions::default();
    for p in pairs {
        if let Some((k, v)) = p.split_once('=') {
            opts.params.insert(k.trim().to_string(), v.trim().to_string());
        }
    }
    opts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engines_by_name() {
        assert_eq!(parse_engine("Redis"), Some(Engine::Redis));
        assert_eq!(parse_engine("mock"), Some(Engine::Mock));
        assert_eq!(parse_engine("kafka"), None);
    }

    #[test]
    fn connect_pairs() {
        let opts = parse_connect_kv(&[
            "url=redis://10.0.0.1:6379/0".to_string(),
            "junk".to_string(),
        ]);
        assert_eq!(opts.params.len(), 1);
        assert_eq!(opts.params["url"], "redis://10.0.0.1:6379/0");
    }
}
