//! Prompt rendering.
//!
//! Templates use `{field}` placeholders; `{{` and `}}` produce literal braces.
//! The template is parsed once when it is loaded, so an unknown placeholder is a
//! configuration error at startup rather than a failure on every work item.

use crate::{Card, Dimension, TemplateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    CardName,
    Direction,
    Summary,
    Detail,
    DimensionName,
    Category,
    Description,
    Aspect,
    AspectType,
}

impl Field {
    fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "card_name" => Self::CardName,
            "direction" => Self::Direction,
            "summary" => Self::Summary,
            "detail" => Self::Detail,
            "dimension_name" => Self::DimensionName,
            "category" => Self::Category,
            "description" => Self::Description,
            "aspect" => Self::Aspect,
            "aspect_type" => Self::AspectType,
            _ => return None,
        })
    }

    fn write(self, out: &mut String, card: &Card, dimension: &Dimension) {
        match self {
            Self::CardName => out.push_str(card.name.as_str()),
            Self::Direction => out.push_str(card.direction.label()),
            Self::Summary => out.push_str(&card.summary),
            Self::Detail => out.push_str(&card.detail),
            Self::DimensionName => out.push_str(dimension.name.as_str()),
            Self::Category => out.push_str(&dimension.category),
            Self::Description => out.push_str(&dimension.description),
            Self::Aspect => out.push_str(dimension.aspect.as_deref().unwrap_or_default()),
            Self::AspectType => {
                if let Some(v) = dimension.aspect_type {
                    out.push_str(&v.to_string());
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A parsed prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
    source_len: usize,
}

impl PromptTemplate {
    /// Parses `source`, validating every placeholder.
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        if c == '{' {
                            return Err(TemplateError::UnbalancedBrace { position: pos });
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(TemplateError::UnbalancedBrace { position: pos });
                    }
                    let field = Field::parse(&name)
                        .ok_or(TemplateError::UnknownPlaceholder { name })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => return Err(TemplateError::UnbalancedBrace { position: pos }),
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            segments,
            source_len: source.len(),
        })
    }

    /// Renders the prompt for one card under one dimension.
    pub fn render(&self, card: &Card, dimension: &Dimension) -> String {
        let mut out = String::with_capacity(self.source_len + card.detail.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(field) => field.write(&mut out, card, dimension),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CardName, DimensionName, Direction};

    fn card() -> Card {
        Card {
            name: CardName::new("星星").unwrap(),
            direction: Direction::Reversed,
            summary: "失去希望".into(),
            detail: "细节".into(),
        }
    }

    fn dimension() -> Dimension {
        Dimension {
            name: DimensionName::new("感情-未来").unwrap(),
            category: "感情".into(),
            description: "未来走向".into(),
            aspect: Some("未来".into()),
            aspect_type: Some(3),
        }
    }

    #[test]
    fn substitutes_every_field() {
        let template = PromptTemplate::parse(
            "{card_name}|{direction}|{summary}|{detail}|{dimension_name}|{category}|{description}|{aspect}|{aspect_type}",
        )
        .unwrap();
        assert_eq!(
            template.render(&card(), &dimension()),
            "星星|逆位|失去希望|细节|感情-未来|感情|未来走向|未来|3"
        );
    }

    #[test]
    fn escaped_braces_are_literal() {
        let template = PromptTemplate::parse("输出 JSON: {{\"text\": \"{card_name}\"}}").unwrap();
        assert_eq!(template.render(&card(), &dimension()), "输出 JSON: {\"text\": \"星星\"}");
    }

    #[test]
    fn missing_optional_fields_render_empty() {
        let mut d = dimension();
        d.aspect = None;
        d.aspect_type = None;
        let template = PromptTemplate::parse("[{aspect}][{aspect_type}]").unwrap();
        assert_eq!(template.render(&card(), &d), "[][]");
    }

    #[test]
    fn rejects_unknown_and_unbalanced_placeholders() {
        assert_eq!(
            PromptTemplate::parse("hello {question}").unwrap_err(),
            TemplateError::UnknownPlaceholder { name: "question".into() }
        );
        assert_eq!(
            PromptTemplate::parse("oops {card_name").unwrap_err(),
            TemplateError::UnbalancedBrace { position: 5 }
        );
        assert_eq!(
            PromptTemplate::parse("a } b").unwrap_err(),
            TemplateError::UnbalancedBrace { position: 2 }
        );
    }
}
