use secrecy::SecretString;

#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub portal_url: String,
    pub login_id: String,
    pub login_pwd: SecretString,
    pub token_queue_url: Option<String>,
    pub solver_url: String,
    pub solver_api_key: Option<SecretString>,
    pub solver_site_key: String,
    pub inbox_relay_url: String,
    pub refresh_interval: u64,
    pub otp_timeout: u64,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(portal_url: String) -> Self {
        Self {
            portal_url,
            login_id: String::new(),
            login_pwd: SecretString::default(),
            token_queue_url: None,
            solver_url: "https://api.capsolver.com".to_string(),
            solver_api_key: None,
            solver_site_key: String::new(),
            inbox_relay_url: String::new(),
            refresh_interval: 600,
            otp_timeout: 120,
        }
    }

    pub fn set_credentials(&mut self, id: String, pwd: SecretString) {
        self.login_id = id;
        self.login_pwd = pwd;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_global_args() {
        let purl = "https://union.portal.tld".to_string();
        let args = GlobalArgs::new(purl);
        assert_eq!(args.portal_url, "https://union.portal.tld");
        assert_eq!(args.login_pwd.expose_secret(), "");
        assert_eq!(args.refresh_interval, 600);
        assert_eq!(args.otp_timeout, 120);
        assert!(args.token_queue_url.is_none());
    }

    #[test]
    fn test_set_credentials() {
        let mut args = GlobalArgs::new("https://union.portal.tld".to_string());
        args.set_credentials("operator".to_string(), SecretString::from("hunter2"));
        assert_eq!(args.login_id, "operator");
        assert_eq!(args.login_pwd.expose_secret(), "hunter2");
    }
}
