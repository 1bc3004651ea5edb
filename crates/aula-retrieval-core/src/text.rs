//! Small text helpers shared by the query normalizer, the generic-word
//! penalty, and the hashed embedder.

/// Replace Latin letters carrying diacritics with their base letter.
///
/// Covers the accented vowels, `ñ` and `ç` used in Spanish, Portuguese,
/// French and Catalan school material. Other characters pass through.
pub fn fold_diacritics(text: &str) -> String {
    text.chars().map(fold_char).collect()
}

fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        'Ç' => 'C',
        other => other,
    }
}

/// Trim, lowercase, collapse whitespace, and fold diacritics.
///
/// This is the cache key for queries: `"  ¿Qué es   la SUMA? "` and
/// `"¿que es la suma?"` share one entry.
pub fn normalize_query(query: &str) -> String {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    fold_diacritics(&collapsed.to_lowercase())
}

/// Lower-cased, accent-folded alphanumeric tokens.
pub fn tokens(text: &str) -> Vec<String> {
    fold_diacritics(&text.to_lowercase())
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
