#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Name,
    Npi,
}

/// One physician to identify, as entered by the user.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: String,
    pub mode: MatchMode,
    pub first: String,
    pub last: String,
    pub npi: String,
    pub state: String,
    pub confirmed: bool,
}

pub fn digits(s: &str) -> String {
    s.chars().filter(char::is_ascii_digit).collect()
}

fn split_fields(line: &str) -> Vec<&str> {
    line.split(',').map(str::trim).collect()
}

/// Parse "First Last, ST" lines. The first whitespace token becomes the
/// first name, the last token the surname; a lone token is treated as a
/// surname. Ids are `n1, n2, ...` in input order.
pub fn parse_names(text: &str) -> Vec<Target> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let fields = split_fields(line);
            let tokens: Vec<&str> = fields[0].split_whitespace().collect();
            let (first, last) = match tokens.as_slice() {
                [] => ("", ""),
                [only] => ("", *only),
                [first, .., last] => (*first, *last),
            };
            Target {
                id: format!("n{}", i + 1),
                mode: MatchMode::Name,
                first: first.to_string(),
                last: last.to_string(),
                npi: String::new(),
                state: fields.get(1).unwrap_or(&"").to_uppercase(),
                confirmed: true,
            }
        })
        .collect()
}

/// Parse "NPI, ST" lines. Non-digit characters in the NPI are stripped.
/// Ids are `p1, p2, ...` in input order.
pub fn parse_npis(text: &str) -> Vec<Target> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .enumerate()
        .map(|(i, line)| {
            let fields = split_fields(line);
            Target {
                id: format!("p{}", i + 1),
                mode: MatchMode::Npi,
                first: String::new(),
                last: String::new(),
                npi: digits(fields[0]),
                state: fields.get(1).unwrap_or(&"").to_uppercase(),
                confirmed: true,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_name_lines_in_order() {
        let targets = parse_names("Amelia Nguyen, tx\n\nJohn Q Smith, FL\n");
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].id, "n1");
        assert_eq!(targets[0].first, "Amelia");
        assert_eq!(targets[0].last, "Nguyen");
        assert_eq!(targets[0].state, "TX");
        assert!(targets[0].confirmed);
        // middle names fold into nothing: first token + last token
        assert_eq!(targets[1].id, "n2");
        assert_eq!(targets[1].first, "John");
        assert_eq!(targets[1].last, "Smith");
    }

    #[test]
    fn lone_token_is_a_surname() {
        let targets = parse_names("Cher, CA");
        assert_eq!(targets[0].first, "");
        assert_eq!(targets[0].last, "Cher");
    }

    #[test]
    fn parses_npi_lines_and_strips_non_digits() {
        let targets = parse_npis("1234-567-890, tx\n1098765432\n");
        assert_eq!(targets[0].id, "p1");
        assert_eq!(targets[0].mode, MatchMode::Npi);
        assert_eq!(targets[0].npi, "1234567890");
        assert_eq!(targets[0].state, "TX");
        assert_eq!(targets[1].id, "p2");
        assert_eq!(targets[1].state, "");
    }

    #[test]
    fn reparsing_identical_input_is_idempotent() {
        let text = "Jane Doe, TX\nJohn Smith, FL";
        let a = parse_names(text);
        let b = parse_names(text);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.id, y.id);
            assert_eq!(x.last, y.last);
        }
    }
}
