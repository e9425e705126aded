/// Where a navigation request should take the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRoute {
    pub target_page: String,
}

impl PageRoute {
    pub fn message(&self) -> String {
        format!("Navigating to the {} page.", self.target_page)
    }
}

pub trait PageRouter: Send + Sync {
    fn route(&self, utterance: &str) -> PageRoute;
}

/// Keyword lookup; anything unrecognised goes home.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordPageRouter;

const PAGE_KEYWORDS: &[(&str, &str)] = &[
    ("transfer", "funds transfer"),
    ("settings", "account settings"),
    ("profile", "profile management"),
];

impl PageRouter for KeywordPageRouter {
    fn route(&self, utterance: &str) -> PageRoute {
        let lowered = utterance.to_lowercase();
        let target_page = PAGE_KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map(|(_, page)| *page)
            .unwrap_or("home");
        PageRoute {
            target_page: target_page.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_pick_pages_in_order() {
        let router = KeywordPageRouter;
        assert_eq!(router.route("Open TRANSFERS").target_page, "funds transfer");
        assert_eq!(router.route("my settings").target_page, "account settings");
        assert_eq!(router.route("edit my profile").target_page, "profile management");
        assert_eq!(
            router.route("transfer settings").target_page,
            "funds transfer"
        );
        assert_eq!(router.route("investments").message(), "Navigating to the home page.");
    }
}
