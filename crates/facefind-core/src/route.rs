//! Navigation surface: the three pages and the gallery entry guard.

use crate::store::MatchReader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Static landing page.
    Landing,
    /// Selfie capture.
    Login,
    /// Match results.
    Gallery,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Landing => "/",
            Self::Login => "/login",
            Self::Gallery => "/gallery",
        }
    }

    /// The route actually entered when navigating to `self`.
    ///
    /// `/gallery` without a stored match redirects to `/login`.
    pub fn resolve(self, state: &MatchReader) -> Route {
        match self {
            Self::Gallery if state.get().is_none() => {
                tracing::info!("no match data; redirecting {} -> {}", self.path(), Self::Login.path());
                Self::Login
            }
            other => other,
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}
