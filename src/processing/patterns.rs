//! Entity pattern library: the regex and keyword tables used by the extractor.
//!
//! Pure data. Everything here compiles once on first use.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

// ============================================================================
// Dates
// ============================================================================

/// `DD/MM/YYYY`
pub static FULL_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("full date pattern should compile")
});

/// `MM/YYYY`
pub static MONTH_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{4})\b").expect("month/year pattern should compile")
});

/// `YYYY-MM-DD`
pub static ISO_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("iso date pattern should compile")
});

/// `15 de julho de 2025`, `julho de 2025`
pub static SPELLED_DATE_PT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{1,2}\s+de\s+)?(?:janeiro|fevereiro|março|marco|abril|maio|junho|julho|agosto|setembro|outubro|novembro|dezembro)\s+de\s+\d{4}\b",
    )
    .expect("portuguese date pattern should compile")
});

/// `July 15, 2025`, `July 2025`
pub static SPELLED_DATE_EN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:january|february|march|april|may|june|july|august|september|october|november|december)(?:\s+\d{1,2})?,?\s+\d{4}\b",
    )
    .expect("english date pattern should compile")
});

// ============================================================================
// Currency amounts
// ============================================================================

/// `R$ 13.239,00` (pt-BR separators)
pub static BRL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"R\$\s*(\d{1,3}(?:\.\d{3})+(?:,\d{1,2})?|\d+(?:,\d{1,2})?)")
        .expect("BRL amount pattern should compile")
});

/// `US$ 1,234.56`, `$1,234.56` (en-US separators)
pub static USD_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:US\$|USD\s?|\$)\s*(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)")
        .expect("USD amount pattern should compile")
});

// ============================================================================
// Names and organizations
// ============================================================================

/// Two or more capitalized words, optionally joined by Portuguese particles.
pub static CAPITALIZED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\p{Lu}\p{Ll}+(?:\s+(?:(?:da|de|do|dos|das)\s+)?\p{Lu}\p{Ll}+)+\b")
        .expect("capitalized name pattern should compile")
});

/// One to four capitalized tokens followed by a legal-entity suffix.
pub static ORG_WITH_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:\p{Lu}[\p{L}\p{N}&'-]*\s+){1,4}(?:Ltda\b\.?|Ltd\b\.?|Inc\b\.?|Corp\b\.?|S\.A\.|S/A\b|LLC\b|GmbH\b|EIRELI\b|ME\b)",
    )
    .expect("organization suffix pattern should compile")
});

/// Institutional prefixes: `Banco do Brasil`, `Grupo Boticário`.
pub static ORG_WITH_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:Banco|Grupo|Instituto|Companhia|Associação|Fundação)(?:\s+(?:do|da|de|dos|das))?(?:\s+\p{Lu}[\p{L}\p{N}&-]*)+",
    )
    .expect("organization prefix pattern should compile")
});

/// Tokens that mark a capitalized run as an organization, never a person.
pub static ORG_TOKENS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "Ltda", "Ltd", "Inc", "Corp", "LLC", "GmbH", "EIRELI", "ME", "SA", "Banco", "Grupo",
        "Instituto", "Companhia", "Associação", "Fundação",
    ]
    .into_iter()
    .collect()
});

// Capitalized words that open sentences or headings rather than names.
pub static NAME_STOPWORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "O", "A", "Os", "As", "Em", "No", "Na", "Nos", "Nas", "Para", "Com", "Por", "Sobre",
        "Prezado", "Prezada", "Caro", "Cara", "Assunto", "Atenciosamente", "Relatório", "Despesas",
        "Receitas", "Total", "Contrato", "Fatura", "Nota", "Manual", "Janeiro", "Fevereiro",
        "Março", "Abril", "Maio", "Junho", "Julho", "Agosto", "Setembro", "Outubro", "Novembro",
        "Dezembro", "The", "This", "Dear", "Subject", "Regards", "Report", "Invoice", "January",
        "February", "March", "April", "May", "June", "July", "August", "September", "October",
        "November", "December",
    ]
    .into_iter()
    .collect()
});

/// Build a case-insensitive matcher for a literal keyword.
///
/// Word boundaries are only asserted next to alphanumeric edges so that
/// keywords like `r$` or `assunto:` still match. Inner whitespace matches
/// any whitespace run.
pub fn keyword_regex(keyword: &str) -> Result<Regex, regex::Error> {
    let trimmed = keyword.trim();
    let body = trimmed
        .split_whitespace()
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"\s+");
    let starts_word = trimmed.chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = trimmed.chars().last().is_some_and(|c| c.is_alphanumeric());

    let mut pattern = String::from("(?i)");
    if starts_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&body);
    if ends_word {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern)
}

/// Collapse whitespace runs into single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
