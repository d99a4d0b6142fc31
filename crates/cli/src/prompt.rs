//! Credit-check prompt.

use context_pack_core::{CreditAction, CreditInfo};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    Action(CreditAction),
    Dismiss,
}

/// Menu text for a credit check.
pub fn menu(info: &CreditInfo) -> String {
    let mut text = if info.has_unlimited {
        format!("{}: {} chunks, unlimited credits.\n", info.source_id, info.total_chunks)
    } else {
        format!(
            "{}: {} chunks need {} credits, you have {}.\n",
            info.source_id, info.total_chunks, info.credits_required, info.user_credits
        )
    };
    for (i, action) in info.actions().iter().enumerate() {
        text.push_str(&format!("  [{}] {}\n", i + 1, action.label()));
    }
    text.push_str("  [d] Dismiss\n> ");
    text
}

/// Parse an answer to [`menu`]. `None` means ask again.
pub fn parse_choice(input: &str, info: &CreditInfo) -> Option<PromptChoice> {
    let input = input.trim();
    if input.eq_ignore_ascii_case("d") {
        return Some(PromptChoice::Dismiss);
    }
    let index: usize = input.parse().ok()?;
    info.actions()
        .get(index.checked_sub(1)?)
        .copied()
        .map(PromptChoice::Action)
}

pub struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    pub fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Ask until the answer parses. End of input dismisses.
    pub async fn credit_check(&mut self, info: &CreditInfo) -> std::io::Result<PromptChoice> {
        loop {
            eprint!("{}", menu(info));
            match self.lines.next_line().await? {
                Some(line) => {
                    if let Some(choice) = parse_choice(&line, info) {
                        return Ok(choice);
                    }
                    eprintln!("Unrecognized choice {:?}", line.trim());
                }
                None => return Ok(PromptChoice::Dismiss),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn short_info() -> CreditInfo {
        CreditInfo {
            source_id: "s1".into(),
            total_chunks: 10,
            credits_required: 10,
            user_credits: 3,
            has_unlimited: false,
            can_proceed: false,
            credits_needed: 7,
        }
    }

    #[test]
    fn test_menu_lists_partial_run_first() {
        let text = menu(&short_info());
        assert!(text.contains("10 chunks need 10 credits, you have 3"));
        assert!(text.contains("[1] Process 3 chunks"));
        assert!(text.contains("[2] Buy credits (7 needed)"));
        assert!(text.contains("[d] Dismiss"));
    }

    #[test]
    fn test_parse_choice() {
        let info = short_info();
        assert_eq!(
            parse_choice(" 1 ", &info),
            Some(PromptChoice::Action(CreditAction::StartPartial { max_chunks: 3 }))
        );
        assert_eq!(
            parse_choice("2", &info),
            Some(PromptChoice::Action(CreditAction::BuyCredits { credits_needed: 7 }))
        );
        assert_eq!(parse_choice("D", &info), Some(PromptChoice::Dismiss));
        assert_eq!(parse_choice("0", &info), None);
        assert_eq!(parse_choice("3", &info), None);
        assert_eq!(parse_choice("yes", &info), None);
    }
}
