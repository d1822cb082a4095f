use runbot_core::models::{Sender, SenderKind};

/// Keeps the agent from reacting to comments written by automation, its own included.
#[derive(Debug, Clone, Default)]
pub struct OriginFilter {
    bot_login: Option<String>,
}

impl OriginFilter {
    pub fn new(bot_login: Option<&str>) -> Self {
        Self { bot_login: bot_login.filter(|l| !l.is_empty()).map(str::to_string) }
    }

    pub fn is_ignored(&self, sender: &Sender) -> bool {
        if sender.kind == SenderKind::Automation {
            return true;
        }
        // GitHub logins are case-insensitive
        self.bot_login.as_deref().is_some_and(|login| login.eq_ignore_ascii_case(&sender.login))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(login: &str, kind: SenderKind) -> Sender { Sender { login: login.into(), kind } }

    #[test]
    fn test_bot_type_ignored() {
        let filter = OriginFilter::default();
        assert!(filter.is_ignored(&sender("runbot[bot]", SenderKind::Automation)));
        assert!(filter.is_ignored(&sender("dependabot[bot]", SenderKind::Automation)));
        assert!(!filter.is_ignored(&sender("octocat", SenderKind::Human)));
    }

    #[test]
    fn test_configured_login_ignored() {
        let filter = OriginFilter::new(Some("RunBot-Account"));
        assert!(filter.is_ignored(&sender("runbot-account", SenderKind::Human)));
        assert!(!filter.is_ignored(&sender("octocat", SenderKind::Human)));
        assert!(!OriginFilter::new(Some("")).is_ignored(&sender("", SenderKind::Human)));
    }
}
