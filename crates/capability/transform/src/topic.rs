//! MQTT topic filter 匹配与校验。

/// topic filter 不合法。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("topic filter is empty")]
    Empty,
    #[error("invalid wildcard in topic filter {filter}: {reason}")]
    Wildcard { filter: String, reason: &'static str },
}

/// 校验 topic filter：`+` 必须独占一级，`#` 必须独占最后一级。
pub fn validate_topic_filter(filter: &str) -> Result<(), TopicError> {
    if filter.is_empty() {
        return Err(TopicError::Empty);
    }
    let levels: Vec<&str> = filter.split('/').collect();
    let last = levels.len() - 1;
    for (index, level) in levels.iter().enumerate() {
        if level.contains('#') && (*level != "#" || index != last) {
            return Err(TopicError::Wildcard {
                filter: filter.to_string(),
                reason: "'#' must be the whole last level",
            });
        }
        if level.contains('+') && *level != "+" {
            return Err(TopicError::Wildcard {
                filter: filter.to_string(),
                reason: "'+' must be a whole level",
            });
        }
    }
    Ok(())
}

/// topic 是否匹配 filter。
///
/// `+` 匹配恰好一级；`#` 匹配剩余所有级（包括父级本身，`a/#` 匹配 `a`）。
pub fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_wildcard() {
        assert!(topic_matches("sensors/+/temp", "sensors/a/temp"));
        assert!(!topic_matches("sensors/+/temp", "sensors/a/b/temp"));
        assert!(!topic_matches("sensors/+/temp", "sensors/temp"));
        assert!(topic_matches("+", "a"));
    }

    #[test]
    fn multi_level_wildcard() {
        assert!(topic_matches("sensors/#", "sensors/a/b/c"));
        assert!(topic_matches("sensors/#", "sensors"));
        assert!(topic_matches("#", "anything/at/all"));
        assert!(!topic_matches("sensors/#", "other/a"));
    }

    #[test]
    fn exact_topics() {
        assert!(topic_matches("a/b", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
    }

    #[test]
    fn validates_filters() {
        assert!(validate_topic_filter("node/+/thermometer/#").is_ok());
        assert!(validate_topic_filter("#").is_ok());
        assert_eq!(validate_topic_filter(""), Err(TopicError::Empty));
        assert!(validate_topic_filter("a/#/b").is_err());
        assert!(validate_topic_filter("a/b#").is_err());
        assert!(validate_topic_filter("a/x+/b").is_err());
    }
}
