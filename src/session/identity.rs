use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who is logged in. Persisted next to the credential but validated on its own.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new<S: Into<String>>(username: S, roles: Vec<String>) -> Self {
        Self { username: username.into(), roles }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// Parse the persisted form. The shape is checked by hand so that, for example, a
    /// `roles` string is reported as such instead of being coerced.
    pub fn from_stored(raw: &str) -> Result<Self, String> {
        let v: Value = serde_json::from_str(raw).map_err(|e| format!("invalid json: {}", e))?;
        let obj = v.as_object().ok_or_else(|| "identity is not an object".to_string())?;
        let username = obj
            .get("username")
            .and_then(|u| u.as_str())
            .ok_or_else(|| "username is not a string".to_string())?;
        let roles = obj
            .get("roles")
            .and_then(|r| r.as_array())
            .ok_or_else(|| "roles is not an array".to_string())?;
        let mut out = Vec::with_capacity(roles.len());
        for r in roles {
            match r.as_str() {
                Some(s) => out.push(s.to_string()),
                None => return Err(format!("role {} is not a string", r)),
            }
        }
        Ok(Self { username: username.to_string(), roles: out })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_identity() {
        let id = Identity::from_stored(r#"{"username":"alice","roles":["user","ADMIN"]}"#).unwrap();
        assert_eq!(id, Identity::new("alice", vec!["user".into(), "ADMIN".into()]));
        assert!(id.has_role("admin"));
        assert!(!id.has_role("owner"));
    }

    #[test]
    fn rejects_bad_shapes() {
        assert!(Identity::from_stored(r#"{"username":"alice","roles":"user"}"#).is_err());
        assert!(Identity::from_stored(r#"{"username":7,"roles":[]}"#).is_err());
        assert!(Identity::from_stored(r#"{"username":"alice","roles":["user",3]}"#).is_err());
        assert!(Identity::from_stored(r#"["alice"]"#).is_err());
        assert!(Identity::from_stored("{not json").is_err());
        assert!(Identity::from_stored(r#"{"username":"alice"}"#).is_err());
    }
}
