//! OpenWebIF response shapes that mix numeric and string-numeric fields.

use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntOrStr(pub i64);

impl From<IntOrStr> for i64 {
    fn from(v: IntOrStr) -> i64 {
        v.0
    }
}

impl<'de> Deserialize<'de> for IntOrStr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(IntOrStr(n)),
            Repr::Text(s) if s.trim().is_empty() => Ok(IntOrStr(0)),
            Repr::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(IntOrStr)
                .or_else(|_| s.trim().parse::<f64>().map(|f| IntOrStr(f as i64)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentService {
    pub service_ref: String,
    pub service_name: String,
}

#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub snr: i64,
    pub agc: i64,
    pub ber: i64,
    pub locked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_numeric_json() {
        let v: IntOrStr = serde_json::from_str("42").unwrap();
        assert_eq!(v.0, 42);
    }

    #[test]
    fn accepts_string_json() {
        let v: IntOrStr = serde_json::from_str("\"42\"").unwrap();
        assert_eq!(v.0, 42);
    }

    #[test]
    fn empty_string_collapses_to_zero() {
        let v: IntOrStr = serde_json::from_str("\"\"").unwrap();
        assert_eq!(v.0, 0);
    }
}
