// src/pipeline/category.rs
//! Keyword-table classification and the 0-100 criticality heuristic.

/// Category keyword sets, scanned in this order. Scoring counts distinct
/// keywords present; the strictly highest nonzero score wins. Ties between
/// equally scored categories resolve to the earlier table entry, so the
/// order here is load-bearing.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    (
        "Malware Analysis",
        &[
            "malware", "trojan", "virus", "worm", "ransomware", "spyware", "backdoor", "rootkit",
            "infection", "payload",
        ],
    ),
    (
        "Data Breach",
        &[
            "breach",
            "leak",
            "stolen data",
            "data exposure",
            "database dump",
            "credentials leaked",
            "password dump",
            "personal information",
        ],
    ),
    (
        "Vulnerability Disclosure",
        &[
            "vulnerability",
            "cve-",
            "exploit",
            "zero-day",
            "security flaw",
            "bug",
            "weakness",
            "patch",
            "update required",
        ],
    ),
    (
        "Cyber Attack",
        &[
            "attack",
            "hack",
            "compromised",
            "intrusion",
            "unauthorized access",
            "infiltration",
            "incident",
            "incursion",
        ],
    ),
    (
        "Exploit Development",
        &[
            "exploit code",
            "proof of concept",
            "poc",
            "exploit development",
            "metasploit",
            "payload generator",
        ],
    ),
    (
        "Network Security",
        &[
            "network",
            "firewall",
            "ddos",
            "dos attack",
            "traffic",
            "packet",
            "router",
            "switch",
            "infrastructure",
        ],
    ),
    (
        "Security Research",
        &[
            "research",
            "analysis",
            "study",
            "findings",
            "paper",
            "whitepaper",
            "report",
        ],
    ),
];

/// Base criticality per category. Uncategorized content starts at 40; a
/// category missing from the table entirely falls back to 50.
const CATEGORY_BASE_SCORES: &[(&str, i32)] = &[
    ("Malware Analysis", 70),
    ("Data Breach", 85),
    ("Vulnerability Disclosure", 80),
    ("Threat Intelligence", 65),
    ("Security Research", 50),
    ("Cyber Attack", 90),
    ("Exploit Development", 75),
    ("Network Security", 60),
    ("Uncategorized", 40),
];

const HIGH_PRIORITY_KEYWORDS: [&str; 12] = [
    "critical",
    "urgent",
    "immediate",
    "severe",
    "high risk",
    "zero-day",
    "active exploit",
    "live attack",
    "breach confirmed",
    "data leaked",
    "credentials exposed",
    "massive breach",
];

const LOW_PRIORITY_KEYWORDS: [&str; 8] = [
    "discussion",
    "forum",
    "general",
    "informational",
    "news",
    "analysis only",
    "historical",
    "old",
];

/// Scans the lowercased title+body against the keyword tables and returns
/// the best-scoring category, or "Uncategorized" when nothing matches.
pub fn detect_category(content: &str, title: &str) -> String {
    let haystack = format!("{content} {title}").to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords.iter().filter(|k| haystack.contains(**k)).count();
        if score > 0 && best.map_or(true, |(_, s)| score > s) {
            best = Some((category, score));
        }
    }

    match best {
        Some((category, _)) => category.to_string(),
        None => "Uncategorized".to_string(),
    }
}

/// Category base score, +5 per distinct high-priority keyword, -3 per
/// distinct low-priority keyword, clamped to [0, 100].
pub fn calculate_criticality(content: &str, title: &str, category: &str) -> u8 {
    let haystack = format!("{content} {title}").to_lowercase();

    let base = CATEGORY_BASE_SCORES
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, s)| *s)
        .unwrap_or(50);

    let high = HIGH_PRIORITY_KEYWORDS
        .iter()
        .filter(|k| haystack.contains(**k))
        .count() as i32;
    let low = LOW_PRIORITY_KEYWORDS
        .iter()
        .filter(|k| haystack.contains(**k))
        .count() as i32;

    (base + high * 5 - low * 3).clamp(0, 100) as u8
}
