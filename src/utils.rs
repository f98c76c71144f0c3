use crate::models::AvailabilityResult;

/// Split a comma-separated address list, dropping blanks.
pub fn split_emails(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

/// Order-independent identity of a recipient list.
pub fn recipient_key(emails: &[String]) -> Vec<String> {
    let mut key = emails.to_vec();
    key.sort();
    key.dedup();
    key
}

pub fn format_subject(movie_name: &str, theatres: &[AvailabilityResult]) -> String {
    match theatres {
        [single] => format!(
            "Tickets now available for '{}' at {} on {}!",
            movie_name, single.theatre_name, single.readable_date
        ),
        many => format!(
            "Tickets now available for '{}' at {} theatres!",
            movie_name,
            many.len()
        ),
    }
}

pub fn format_body_plain_text(movie_name: &str, theatres: &[AvailabilityResult]) -> String {
    let mut output = format!("Great news! '{}' tickets are now available!\n\n", movie_name);

    match theatres {
        [single] => {
            output.push_str(&format!("Theatre: {}\n", single.theatre_name));
            output.push_str(&format!("Date: {}\n", single.readable_date));
            output.push_str(&format!("Book here: {}\n", single.url));
        }
        many => {
            output.push_str(&format!("Available at {} theatres:\n\n", many.len()));
            for (i, theatre) in many.iter().enumerate() {
                output.push_str(&format!(
                    "{}. {} - {}\n",
                    i + 1,
                    theatre.theatre_name,
                    theatre.readable_date
                ));
                output.push_str(&format!("   Book here: {}\n\n", theatre.url));
            }
        }
    }

    output.push_str(&format!("\nMovie: {}", movie_name));
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, date: &str, url: &str) -> AvailabilityResult {
        AvailabilityResult {
            url: url.to_string(),
            theatre_name: name.to_string(),
            readable_date: date.to_string(),
        }
    }

    #[test]
    fn test_split_emails() {
        assert_eq!(split_emails("a@x.com, b@x.com,,  "), vec!["a@x.com", "b@x.com"]);
        assert!(split_emails("").is_empty());
        assert!(split_emails(" , ").is_empty());
    }

    #[test]
    fn test_recipient_key_ignores_order_and_duplicates() {
        let a = vec!["b@x.com".to_string(), "a@x.com".to_string(), "b@x.com".to_string()];
        let b = vec!["a@x.com".to_string(), "b@x.com".to_string()];
        assert_eq!(recipient_key(&a), recipient_key(&b));
    }

    #[test]
    fn test_single_theatre_message() {
        let theatres = vec![result("Prasads Multiplex", "09/08/2025", "https://example.com/p")];
        assert_eq!(
            format_subject("Athadu", &theatres),
            "Tickets now available for 'Athadu' at Prasads Multiplex on 09/08/2025!"
        );

        let body = format_body_plain_text("Athadu", &theatres);
        assert!(body.contains("Theatre: Prasads Multiplex\n"));
        assert!(body.contains("Date: 09/08/2025\n"));
        assert!(body.contains("Book here: https://example.com/p\n"));
        assert!(body.ends_with("Movie: Athadu"));
    }

    #[test]
    fn test_multi_theatre_message_is_enumerated() {
        let theatres = vec![
            result("Prasads Multiplex", "09/08/2025", "https://example.com/p"),
            result("Sudarshan 35mm", "08/08/2025", "https://example.com/s"),
        ];
        assert_eq!(
            format_subject("Athadu", &theatres),
            "Tickets now available for 'Athadu' at 2 theatres!"
        );

        let body = format_body_plain_text("Athadu", &theatres);
        assert!(body.contains("Available at 2 theatres:"));
        assert!(body.contains("1. Prasads Multiplex - 09/08/2025\n   Book here: https://example.com/p"));
        assert!(body.contains("2. Sudarshan 35mm - 08/08/2025\n   Book here: https://example.com/s"));
    }
}
