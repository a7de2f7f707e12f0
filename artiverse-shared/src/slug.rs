/// Lowercase ASCII, hyphen-separated slug for URLs.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// `base`, `base-2`, `base-3`, ... until `taken` says no.
pub fn unique_slug(base: &str, mut taken: impl FnMut(&str) -> bool) -> String {
    if !taken(base) {
        return base.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Starry Night (1889)"), "starry-night-1889");
        assert_eq!(slugify("  --Hello,   World!-- "), "hello-world");
        assert_eq!(slugify("???"), "untitled");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let existing = ["blue", "blue-2"];
        assert_eq!(unique_slug("blue", |s| existing.contains(&s)), "blue-3");
        assert_eq!(unique_slug("red", |s| existing.contains(&s)), "red");
    }
}
