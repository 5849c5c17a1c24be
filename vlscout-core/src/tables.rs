//! Keyword and domain tables consulted by the classifier and seed providers.
//!
//! These are data, not logic: every table can be replaced from a JSON config.

use serde::{Deserialize, Serialize};

const BANNED_DOMAINS: &[&str] = &[
    ".ir", "zula.ir", "mci.ir", "arvancloud", "derp", "mobinnet", "shatel", ".cn", ".pk", ".af",
    ".sy", ".sa",
];

const BLOCKED_KEYWORDS: &[&str] = &[
    "google.com", "youtube.com", "facebook.com", "instagram.com", "twitter.com", "cloudflare",
    "amazon", "microsoft", "oracle", "147135001195.sec22org.com", "fuck.rkn", "iran", "cloud",
    "doubleclick", "adservice", "analytics", "osl-no-01.fromblancwithlove.com", "pornhub",
    "xvideos", "iryiccyne.wwtraveler.com", "bet", "casino", "cdnjs.com", "yahoo.com", "azure.com",
    "vpn", "proxy", "tunnel", "ams1.fromblancwithlove.com", "chatgpt.com", "github.com",
    "gos9.portal-guard.com", "worker", "pages.dev", "herokuapp", "excoino.com", "pizza",
    "paypal.com", "apple.com", "tradingview.com", "mynoderu.nodesecure.ru", "free", "ebrasha",
    "whatsapp.com", "fonts", "dl1-uk-cdn.easy-upload.org", "test", "localhost", "127.0.0.1",
];

const ALLOWLIST: &[&str] = &[
    "gosuslugi.ru", "yandex.ru", "yandex.net", "yastatic.net", "vk.com", "userapi.com", "mail.ru",
    "ok.ru", "okcdn.ru", "ozon.ru", "ozone.ru", "wildberries.ru", "wb.ru", "tbank.ru",
    "tinkoff.ru", "sberbank.ru", "alfabank.ru", "gazprombank.ru", "mos.ru", "rutube.ru", "dzen.ru",
    "avito.ru", "kinopoisk.ru", "dns-shop.ru", "rzd.ru", "pochta.ru", "nalog.ru", "mts.ru",
    "megafon.ru", "beeline.ru", "t2.ru", "2gis.ru", "hh.ru", "rbc.ru", "lenta.ru", "rambler.ru",
    "kremlin.ru", "government.ru", "yandexcloud.net", "x5.ru", "ivi.ru", "drom.ru", "tutu.ru",
];

const REGIONAL_INDICATORS: &[&str] = &["russia", "moscow", "\u{1F1F7}\u{1F1FA}"];

const GUIDE_PHRASES: &[&str] = &[
    "how to",
    "step 1",
    "tutorial",
    "instruction",
    "download the app",
    "subscribe to our",
    "join our channel",
    "инструкция",
    "как подключить",
    "как настроить",
    "скачайте приложение",
    "подписывайтесь",
];

const PLACEHOLDER_CREDENTIALS: &[&str] = &[
    "uuid",
    "your-uuid",
    "your_uuid",
    "yourid",
    "00000000-0000-0000-0000-000000000000",
    "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx",
];

const PLACEHOLDER_HOSTS: &[&str] = &["server", "example.com", "your-server", "your.domain", "1.1.1.1", "ip"];

const REQUIRED_PARAMS: &[(&str, &str)] = &[("security", "reality"), ("type", "grpc")];

const SEARCH_QUERIES: &[&str] = &[
    "vless reality whitelist extension:txt",
    "vless reality whitelist extension:json",
    "vless reality whitelist extension:yaml",
    "filename:nodes.txt vless reality",
    "filename:sub.txt vless reality",
    "filename:config.json security=reality",
    "vless reality gosuslugi",
    "vless reality yandex",
    "security=reality fp=chrome",
    "vless sub RU extension:txt",
];

const GIST_KEYWORDS: &[&str] = &["vless", "reality", "sub", "nodes", "free", "v2ray"];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    /// Any occurrence hard-blocks a document. Entries starting with `.` match as a TLD.
    pub banned_domains: Vec<String>,
    /// Regex for a script alphabet that hard-blocks a document.
    pub banned_script: String,
    /// Disfavoured SNI/host keywords, counted for the bad ratio.
    pub blocked_keywords: Vec<String>,
    /// Trusted regional service hostnames.
    pub allowlist: Vec<String>,
    /// Regex for the regional script alphabet, counted as an allowlist marker.
    pub regional_script: String,
    pub regional_indicators: Vec<String>,
    pub guide_phrases: Vec<String>,
    pub placeholder_credentials: Vec<String>,
    pub placeholder_hosts: Vec<String>,
    /// `(key, value)` query pairs; an entry must carry at least one.
    pub required_params: Vec<(String, String)>,
    pub search_queries: Vec<String>,
    pub gist_keywords: Vec<String>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            banned_domains: owned(BANNED_DOMAINS),
            banned_script: r"[؀-ۿ]".to_string(),
            blocked_keywords: owned(BLOCKED_KEYWORDS),
            allowlist: owned(ALLOWLIST),
            regional_script: r"[а-яА-ЯёЁ]".to_string(),
            regional_indicators: owned(REGIONAL_INDICATORS),
            guide_phrases: owned(GUIDE_PHRASES),
            placeholder_credentials: owned(PLACEHOLDER_CREDENTIALS),
            placeholder_hosts: owned(PLACEHOLDER_HOSTS),
            required_params: REQUIRED_PARAMS
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            search_queries: owned(SEARCH_QUERIES),
            gist_keywords: owned(GIST_KEYWORDS),
        }
    }
}
