//! Cookie model and per-request cookie collection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::str::FromStr;

/// One HTTP cookie as seen by application code.
///
/// Setters are fluent so adapters can project native cookie fields in a
/// chain. Ordering compares by name only, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<i64>,
    secure: bool,
    http_only: bool,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn max_age(&self) -> Option<i64> {
        self.max_age
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    pub fn set_value(&mut self, value: impl Into<String>) -> &mut Self {
        self.value = value.into();
        self
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) -> &mut Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn set_path(&mut self, path: impl Into<String>) -> &mut Self {
        self.path = Some(path.into());
        self
    }

    pub fn set_max_age(&mut self, seconds: i64) -> &mut Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn set_secure(&mut self, secure: bool) -> &mut Self {
        self.secure = secure;
        self
    }

    pub fn set_http_only(&mut self, http_only: bool) -> &mut Self {
        self.http_only = http_only;
        self
    }

    /// Render as a `Set-Cookie` header value.
    pub fn to_set_cookie(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(domain) = &self.domain {
            out.push_str("; Domain=");
            out.push_str(domain);
        }
        if let Some(path) = &self.path {
            out.push_str("; Path=");
            out.push_str(path);
        }
        if let Some(max_age) = self.max_age {
            out.push_str("; Max-Age=");
            out.push_str(&max_age.to_string());
        }
        if self.secure {
            out.push_str("; Secure");
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        out
    }
}

impl PartialOrd for Cookie {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cookie {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

/// Request cookies indexed by name, built once per request.
///
/// Preserves the engine's iteration order; when the same name occurs more
/// than once, the last occurrence wins for [`CookieJar::find_cookie`] and
/// [`CookieJar::get`], while [`CookieJar::get_all`] keeps every occurrence.
#[derive(Debug, Default, Clone)]
pub struct CookieJar {
    all: Vec<Cookie>,
    by_name: HashMap<String, usize>,
}

impl CookieJar {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        let mut by_name = HashMap::with_capacity(cookies.len());
        for (idx, cookie) in cookies.iter().enumerate() {
            by_name.insert(cookie.name.clone(), idx);
        }
        Self {
            all: cookies,
            by_name,
        }
    }

    /// Parse from raw `Cookie` header values (`name=value; other=v2`).
    pub fn from_header_values<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let mut cookies = Vec::new();
        for header in values {
            for pair in header.split(';') {
                let mut parts = pair.trim().splitn(2, '=');
                let name = match parts.next() {
                    Some(n) if !n.is_empty() => n.trim(),
                    _ => continue,
                };
                let value = parts.next().unwrap_or("").trim();
                cookies.push(Cookie::new(name, value));
            }
        }
        Self::new(cookies)
    }

    pub fn find_cookie(&self, name: &str) -> Option<&Cookie> {
        self.by_name.get(name).map(|&idx| &self.all[idx])
    }

    /// Fetch a cookie value converted to `T`. Absent cookies and failed
    /// conversions both yield `None`.
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.find_cookie(name).and_then(|c| c.value.parse().ok())
    }

    /// Every cookie in iteration order, duplicates included.
    pub fn get_all(&self) -> &[Cookie] {
        &self.all
    }

    /// Distinct cookies in iteration order, one per name (last wins).
    pub fn values(&self) -> Vec<&Cookie> {
        self.all
            .iter()
            .enumerate()
            .filter(|(idx, cookie)| self.by_name.get(cookie.name()) == Some(idx))
            .map(|(_, cookie)| cookie)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
