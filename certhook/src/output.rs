use console::style;
use std::fmt::Display;

pub fn brand_error<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).for_stderr().red()
}

pub fn brand_warning<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).for_stderr().yellow()
}

pub fn brand_success<D: Display>(value: D) -> console::StyledObject<D> {
    style(value).for_stderr().green()
}

pub fn error_stderr(message: &str) {
    eprintln!("{} {}", brand_error("✗").bold(), message.trim());
}

pub fn warning_stderr(message: &str) {
    eprintln!("{} {}", brand_warning("!").bold(), message.trim());
}

pub fn success_stderr(message: &str) {
    eprintln!("{} {}", brand_success("✓").bold(), message.trim());
}
