use crate::models::Language;
use url::Url;

pub const DIRECT: &str = "direct";
pub const INTERNAL: &str = "internal";
pub const GOOGLE: &str = "google";
pub const SOCIAL: &str = "social";
pub const REFERRAL: &str = "referral";
pub const UNKNOWN: &str = "unknown";

const SOCIAL_DOMAINS: [&str; 4] = ["facebook", "instagram", "twitter", "linkedin"];

// Precedence: utm_source, missing referrer, unparseable referrer, search and
// social domains, foreign host, then same host.
pub fn detect_source(location: &str, referrer: Option<&str>) -> String {
    let current = Url::parse(location).ok();

    if let Some(utm) = current.as_ref().and_then(utm_source) {
        return utm;
    }

    let referrer = match referrer.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return DIRECT.to_string(),
    };

    let Ok(referrer_url) = Url::parse(referrer) else {
        return UNKNOWN.to_string();
    };
    let referrer_host = host_of(&referrer_url);

    if referrer_host.contains(GOOGLE) {
        return GOOGLE.to_string();
    }
    if SOCIAL_DOMAINS.iter().any(|domain| referrer_host.contains(domain)) {
        return SOCIAL.to_string();
    }

    let current_host = current.as_ref().map(host_of).unwrap_or_default();
    if referrer_host != current_host {
        return REFERRAL.to_string();
    }
    INTERNAL.to_string()
}

fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

fn utm_source(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "utm_source")
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn page_path(location: &str) -> String {
    match Url::parse(location) {
        Ok(url) => url.path().to_string(),
        Err(_) if location.starts_with('/') => location
            .split(['?', '#'])
            .next()
            .unwrap_or("/")
            .to_string(),
        Err(_) => "/".to_string(),
    }
}

pub fn source_display_name(label: &str, language: Language) -> String {
    let name = match (label, language) {
        ("direct", Language::Pt) => "Direto",
        ("direct", Language::En) => "Direct",
        ("google", _) => "Google",
        ("social", Language::Pt) => "Redes Sociais",
        ("social", Language::En) => "Social Media",
        ("referral", Language::Pt) => "Referências",
        ("referral", Language::En) => "Referrals",
        ("email", _) => "Email",
        ("search", Language::Pt) => "Busca Orgânica",
        ("search", Language::En) => "Organic Search",
        _ => return label.to_string(),
    };
    name.to_string()
}
