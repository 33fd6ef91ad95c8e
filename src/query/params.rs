//! List Query Parameters: the request's filter/sort/pagination input, parsed but not yet checked
//! against a schema.

use crate::query::SortDirection;

#[derive(Clone, Debug, PartialEq)]
pub struct RawFilter {
    pub field: String,
    pub op: String,
    pub value: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQueryParams {
    pub filters: Vec<RawFilter>,
    pub sort: Vec<(String, SortDirection)>,
    /// Paging values stay raw; the compiler parses them after the filters are checked.
    pub page: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl ListQueryParams {
    /// `field=v` and `field__op=v` become filters; `sort=a,-b`; `page`, `limit`, `offset`.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut out = ListQueryParams::default();
        for (k, v) in pairs {
            match k.as_str() {
                "sort" => {
                    for part in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                        let (field, direction) = if let Some(f) = part.strip_prefix('-') {
                            (f, SortDirection::Desc)
                        } else if let Some(f) = part.strip_prefix('+') {
                            (f, SortDirection::Asc)
                        } else {
                            (part, SortDirection::Asc)
                        };
                        out.sort.push((field.to_string(), direction));
                    }
                }
                "page" => out.page = Some(v),
                "limit" => out.limit = Some(v),
                "offset" => out.offset = Some(v),
                _ => {
                    let (field, op) = match k.rsplit_once("__") {
                        Some((field, op)) => (field.to_string(), op.to_string()),
                        None => (k, "eq".to_string()),
                    };
                    out.filters.push(RawFilter { field, op, value: v });
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn splits_filters_sort_and_paging() {
        let p = ListQueryParams::from_pairs(pairs(&[
            ("name", "A"),
            ("price__gte", "2"),
            ("sort", "-price, name,+id"),
            ("page", "2"),
            ("limit", "10"),
        ]));
        assert_eq!(
            p.filters,
            vec![
                RawFilter { field: "name".into(), op: "eq".into(), value: "A".into() },
                RawFilter { field: "price".into(), op: "gte".into(), value: "2".into() },
            ]
        );
        assert_eq!(
            p.sort,
            vec![
                ("price".into(), SortDirection::Desc),
                ("name".into(), SortDirection::Asc),
                ("id".into(), SortDirection::Asc),
            ]
        );
        assert_eq!(p.page.as_deref(), Some("2"));
        assert_eq!(p.limit.as_deref(), Some("10"));
        assert_eq!(p.offset, None);
    }

    #[test]
    fn paging_values_are_kept_raw() {
        // the compiler rejects these, after filter legality
        let p = ListQueryParams::from_pairs(pairs(&[("limit", "ten"), ("offset", "-1")]));
        assert_eq!(p.limit.as_deref(), Some("ten"));
        assert_eq!(p.offset.as_deref(), Some("-1"));
        assert!(p.filters.is_empty());
    }
}
