// Company name helpers: folder-name extraction and legal-form shortening

use crate::model::LegalName;

/// Keywords of merger/holding entities whose canonical names carry no
/// usable quoted part. For these the observed portal name is used instead.
pub const DEFAULT_MERGER_KEYWORDS: &[&str] = &[
    "ТРАНСЭНЕРГО",
    "ГАЗПРОМ ЭНЕРГОСБЫТ ТЮМЕНЬ",
    "ОБОРОНЭНЕРГО",
    "ДЭК",
    "ОЭК",
    "АТОМЭНЕРГОСБЫТ",
];

/// Long legal forms and their abbreviations, applied in order.
const LEGAL_FORMS: &[(&str, &str)] = &[
    ("Общество с ограниченной ответственностью", "ООО"),
    ("Закрытое акционерное", "ЗАО"),
    ("Акционерное общество", "АО"),
    ("Муниципальное унитарное предприятие", "МУП"),
    ("Акционерное Общество", "АО"),
    ("Общество с ограниченной ответственность", "ООО"),
];

/// Derive the short name used for document folders.
///
/// The canonical text is upper-cased. A merger keyword anywhere in it selects
/// `display_name`; otherwise the first quoted substring is taken; otherwise
/// the upper-cased text itself.
pub fn extract_name<S: AsRef<str>>(canonical: &LegalName, display_name: &str, keywords: &[S]) -> String {
    let text = canonical.as_str().to_uppercase();

    if keywords
        .iter()
        .map(|k| k.as_ref().trim().to_uppercase())
        .any(|k| !k.is_empty() && text.contains(&k))
    {
        return display_name.to_string();
    }

    if let Some(open) = text.find('"') {
        let rest = &text[open + 1..];
        let inner = match rest.find('"') {
            Some(close) => &rest[..close],
            None => rest,
        };
        return inner.to_string();
    }

    text
}

/// Replace long legal forms with their abbreviations.
pub fn shorten_legal_form(name: &str) -> String {
    LEGAL_FORMS
        .iter()
        .fold(name.to_string(), |acc, (long, short)| acc.replace(long, short))
        .trim()
        .to_string()
}
