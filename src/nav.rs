//! Navigation panel model: links, the active item, and expanded/collapsed width.

/// Cookie remembering the sidebar width between pages.
pub const NAV_COOKIE: &str = "qbx_nav";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
    /// Items without a page yet render as disabled entries.
    pub live: bool,
}

pub const NEW_THREAD: NavItem = NavItem {
    label: "New Thread",
    href: "/?new=true",
    live: true,
};

pub const NAV_ITEMS: [NavItem; 4] = [
    NavItem {
        label: "Home",
        href: "/",
        live: true,
    },
    NavItem {
        label: "Discover",
        href: "/discover",
        live: false,
    },
    NavItem {
        label: "Library",
        href: "/library",
        live: true,
    },
    NavItem {
        label: "Spaces",
        href: "/spaces",
        live: false,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavWidth {
    #[default]
    Expanded,
    Collapsed,
}

impl NavWidth {
    pub fn toggled(self) -> Self {
        match self {
            NavWidth::Expanded => NavWidth::Collapsed,
            NavWidth::Collapsed => NavWidth::Expanded,
        }
    }

    pub fn is_expanded(self) -> bool {
        self == NavWidth::Expanded
    }

    pub fn as_cookie_value(self) -> &'static str {
        match self {
            NavWidth::Expanded => "expanded",
            NavWidth::Collapsed => "collapsed",
        }
    }

    /// Unknown or missing values fall back to expanded.
    pub fn from_cookie_value(value: Option<&str>) -> Self {
        match value {
            Some("collapsed") => NavWidth::Collapsed,
            _ => NavWidth::Expanded,
        }
    }
}

/// Whether `item` is the page at `path` (query strings ignored).
pub fn is_active(item: &NavItem, path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    item.href == path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_flips_width() {
        assert_eq!(NavWidth::Expanded.toggled(), NavWidth::Collapsed);
        assert_eq!(NavWidth::Collapsed.toggled(), NavWidth::Expanded);
    }

    #[test]
    fn cookie_round_trip_defaults_to_expanded() {
        assert_eq!(NavWidth::from_cookie_value(Some("collapsed")), NavWidth::Collapsed);
        assert_eq!(NavWidth::from_cookie_value(Some("weird")), NavWidth::Expanded);
        assert_eq!(NavWidth::from_cookie_value(None), NavWidth::Expanded);
    }

    #[test]
    fn active_item_matches_path_only() {
        assert!(is_active(&NAV_ITEMS[0], "/"));
        assert!(is_active(&NAV_ITEMS[2], "/library?q=pie"));
        assert!(!is_active(&NAV_ITEMS[0], "/library"));
    }

    #[test]
    fn only_home_and_library_are_live() {
        let live: Vec<&str> = NAV_ITEMS.iter().filter(|i| i.live).map(|i| i.label).collect();
        assert_eq!(live, vec!["Home", "Library"]);
    }
}
