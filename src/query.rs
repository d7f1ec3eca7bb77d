//! Search query expansion: keywords × cities × transliteration.
use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashMap};

use crate::config::SearchConfig;

static TRANSLIT: Lazy<HashMap<char, &'static str>> = Lazy::new(|| {
    [
        ('а', "a"), ('б', "b"), ('в', "v"), ('г', "g"), ('д', "d"), ('е', "e"),
        ('ё', "yo"), ('ж', "zh"), ('з', "z"), ('и', "i"), ('й', "y"), ('к', "k"),
        ('л', "l"), ('м', "m"), ('н', "n"), ('о', "o"), ('п', "p"), ('р', "r"),
        ('с', "s"), ('т', "t"), ('у', "u"), ('ф', "f"), ('х', "h"), ('ц', "ts"),
        ('ч', "ch"), ('ш', "sh"), ('щ', "sch"), ('ъ', ""), ('ы', "y"), ('ь', ""),
        ('э', "e"), ('ю', "yu"), ('я', "ya"),
        ('А', "A"), ('Б', "B"), ('В', "V"), ('Г', "G"), ('Д', "D"), ('Е', "E"),
        ('Ё', "Yo"), ('Ж', "Zh"), ('З', "Z"), ('И', "I"), ('Й', "Y"), ('К', "K"),
        ('Л', "L"), ('М', "M"), ('Н', "N"), ('О', "O"), ('П', "P"), ('Р', "R"),
        ('С', "S"), ('Т', "T"), ('У', "U"), ('Ф', "F"), ('Х', "H"), ('Ц', "Ts"),
        ('Ч', "Ch"), ('Ш', "Sh"), ('Щ', "Sch"), ('Ъ', ""), ('Ы', "Y"), ('Ь', ""),
        ('Э', "E"), ('Ю', "Yu"), ('Я', "Ya"),
    ]
    .into_iter()
    .collect()
});

/// Cyrillic → Latin letter substitution. Other characters pass through.
pub fn transliterate(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match TRANSLIT.get(&ch) {
            Some(latin) => out.push_str(latin),
            None => out.push(ch),
        }
    }
    out
}

fn non_blank(items: &[String]) -> impl Iterator<Item = &str> {
    items.iter().map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Expands keywords (and optional cities) into a sorted, deduplicated query list.
pub fn expand(keywords: &[String], cities: &[String]) -> Vec<String> {
    let mut queries = BTreeSet::new();

    for keyword in non_blank(keywords) {
        queries.insert(keyword.to_string());
        let translit = transliterate(keyword);
        if translit != keyword {
            queries.insert(translit);
        }
    }

    for keyword in non_blank(keywords) {
        let kw_latin = transliterate(keyword);
        let kw_changed = kw_latin != keyword;
        for city in non_blank(cities) {
            let city_latin = transliterate(city);
            let city_changed = city_latin != city;

            let mut pair = |a: &str, b: &str| {
                queries.insert(format!("{} {}", a, b));
                queries.insert(format!("{} {}", b, a));
            };
            pair(keyword, city);
            if kw_changed {
                pair(&kw_latin, city);
            }
            if city_changed {
                pair(keyword, &city_latin);
            }
            if kw_changed && city_changed {
                pair(&kw_latin, &city_latin);
            }
        }
    }

    queries.into_iter().collect()
}

/// Picks the expansion mode from the search settings.
pub fn plan_queries(cfg: &SearchConfig) -> Vec<String> {
    if cfg.use_city_combinations && non_blank(&cfg.cities).next().is_some() {
        expand(&cfg.keywords, &cfg.cities)
    } else if cfg.use_transliteration {
        expand(&cfg.keywords, &[])
    } else {
        non_blank(&cfg.keywords)
            .map(str::to_string)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn transliterates_cyrillic_only() {
        assert_eq!(transliterate("Щука"), "Schuka");
        assert_eq!(transliterate("съезд"), "sezd");
        assert_eq!(transliterate("rust 2024"), "rust 2024");
    }

    #[test]
    fn empty_keywords_yield_nothing() {
        assert!(expand(&[], &strings(&["Москва"])).is_empty());
        assert!(expand(&strings(&["  "]), &strings(&["Москва"])).is_empty());
    }

    #[test]
    fn latin_keyword_without_cities() {
        assert_eq!(expand(&strings(&["rust", " rust "]), &[]), strings(&["rust"]));
    }

    #[test]
    fn full_cross_product() {
        let got = expand(&strings(&["кафе"]), &strings(&["Москва"]));
        let want = strings(&[
            "Moskva kafe",
            "Moskva кафе",
            "kafe",
            "kafe Moskva",
            "kafe Москва",
            "кафе",
            "кафе Moskva",
            "кафе Москва",
            "Москва kafe",
            "Москва кафе",
        ]);
        let mut want_sorted = want.clone();
        want_sorted.sort();
        assert_eq!(got, want_sorted);
    }

    #[test]
    fn base_terms_survive_city_expansion() {
        let keywords = strings(&["кафе", "bar", "клуб"]);
        let base = expand(&keywords, &[]);
        let with_cities = expand(&keywords, &strings(&["Казань", "Sochi"]));
        for q in &base {
            assert!(with_cities.contains(q), "missing {q}");
        }
    }

    #[test]
    fn output_is_sorted_and_unique() {
        let keywords = strings(&["кафе", "кафе", "bar"]);
        let cities = strings(&["Sochi", "Sochi"]);
        let first = expand(&keywords, &cities);
        let second = expand(&keywords, &cities);
        assert_eq!(first, second);
        let mut sorted = first.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(first, sorted);
    }

    #[test]
    fn plan_respects_flags() {
        let mut cfg = SearchConfig {
            keywords: strings(&["кафе"]),
            cities: strings(&["Sochi"]),
            ..SearchConfig::default()
        };
        assert!(plan_queries(&cfg).contains(&"кафе Sochi".to_string()));

        cfg.use_city_combinations = false;
        assert_eq!(plan_queries(&cfg), strings(&["kafe", "кафе"]));

        cfg.use_transliteration = false;
        assert_eq!(plan_queries(&cfg), strings(&["кафе"]));
    }
}
