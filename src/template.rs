use crate::clock::RunTimestamp;
use crate::registry::{ModelDescriptor, ProviderFields};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Verbatim,
    Upper,
    Lower,
}

impl Directive {
    fn apply(self, value: &str) -> String {
        match self {
            Directive::Verbatim => value.to_string(),
            Directive::Upper => value.to_uppercase(),
            Directive::Lower => value.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Slot(Directive),
}

// A slot past the end of the arguments renders as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlTemplate {
    segments: Vec<Segment>,
}

impl UrlTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn literal(mut self, text: &str) -> Self {
        if text.is_empty() {
            return self;
        }
        match self.segments.last_mut() {
            Some(Segment::Literal(existing)) => existing.push_str(text),
            _ => self.segments.push(Segment::Literal(text.to_string())),
        }
        self
    }

    pub fn slot(mut self, directive: Directive) -> Self {
        self.segments.push(Segment::Slot(directive));
        self
    }

    // `%s` verbatim, `%sU` upper case, `%sL` lower case; any other `%` is literal.
    pub fn parse(format: &str) -> Self {
        let mut template = Self::new();
        let mut literal = String::new();
        let mut rest = format;

        while let Some(pos) = rest.find('%') {
            literal.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];
            let Some(tail) = after.strip_prefix('s') else {
                literal.push('%');
                rest = after;
                continue;
            };
            template = template.literal(&literal);
            literal.clear();
            let (directive, tail) = if let Some(tail) = tail.strip_prefix('U') {
                (Directive::Upper, tail)
            } else if let Some(tail) = tail.strip_prefix('L') {
                (Directive::Lower, tail)
            } else {
                (Directive::Verbatim, tail)
            };
            template = template.slot(directive);
            rest = tail;
        }
        literal.push_str(rest);
        template.literal(&literal)
    }

    pub fn slot_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|segment| matches!(segment, Segment::Slot(_)))
            .count()
    }

    pub fn render<S: AsRef<str>>(&self, args: &[S]) -> String {
        let mut out = String::new();
        let mut args = args.iter();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Slot(directive) => {
                    if let Some(value) = args.next() {
                        out.push_str(&directive.apply(value.as_ref()));
                    }
                }
            }
        }
        out
    }
}

// Range-addressed models ignore `param`: a step's parameters share one archive.
pub fn archive_url(model: &ModelDescriptor, param: &str, run: &RunTimestamp, step: u32) -> String {
    let hour = run.hour_stamp();
    let date = run.date_stamp();
    let step = format!("{step:03}");
    match &model.fields {
        ProviderFields::Dwd { grid, area } => model.url_template.render(&[
            model.name,
            hour.as_str(),
            param,
            model.name,
            *area,
            grid.as_str(),
            date.as_str(),
            hour.as_str(),
            step.as_str(),
            param,
        ]),
        ProviderFields::Noaa { resolution } => model.url_template.render(&[
            date.as_str(),
            hour.as_str(),
            hour.as_str(),
            *resolution,
            step.as_str(),
        ]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_directives_strip_markers() {
        let template = UrlTemplate::parse("%sL_%sU_%s");
        assert_eq!(template.slot_count(), 3);
        assert_eq!(template.render(&["icon", "EU", "03"]), "icon_EU_03");
        assert_eq!(template.render(&["ICON", "eu", "03"]), "icon_EU_03");
    }

    #[test]
    fn missing_trailing_arguments_render_empty() {
        let template = UrlTemplate::parse("a/%s/b/%sU.grib2");
        assert_eq!(template.render(&["x"]), "a/x/b/.grib2");
        assert_eq!(template.render::<&str>(&[]), "a//b/.grib2");
    }

    #[test]
    fn stray_percent_is_literal() {
        let template = UrlTemplate::parse("100%_%s%d");
        assert_eq!(template.slot_count(), 1);
        assert_eq!(template.render(&["x"]), "100%_x%d");
    }

    #[test]
    fn builder_expresses_marker_like_text() {
        let template = UrlTemplate::new()
            .slot(Directive::Verbatim)
            .literal("U")
            .slot(Directive::Lower);
        assert_eq!(template.render(&["a", "B"]), "aUb");
        assert_ne!(template, UrlTemplate::parse("%sU%sL"));
    }
}
