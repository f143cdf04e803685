// crates/gait-cli/src/ticket.rs
// ============================================================================
// Module: Ticket Footer
// Description: The textual receipt handshake embedded in downstream tickets.
// Purpose: Format and validate the run/manifest verification footer.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The footer is a single line:
//! `GAIT run_id=<id> manifest=sha256:<hex> verify="gait verify <id>"`.
//! Run ids are `[A-Za-z0-9_-]+` and the leading and trailing run ids must
//! match for the footer to satisfy the contract.

// ============================================================================
// SECTION: Formatting
// ============================================================================

/// Formats the ticket footer for a run and manifest digest.
#[must_use]
pub fn format_ticket_footer(run_id: &str, manifest_digest: &str) -> String {
    format!("GAIT run_id={run_id} manifest=sha256:{manifest_digest} verify=\"gait verify {run_id}\"")
}

/// Returns true when the footer satisfies the contract.
#[must_use]
pub fn ticket_footer_matches_contract(value: &str) -> bool {
    let Some(rest) = value.strip_prefix("GAIT run_id=") else {
        return false;
    };
    let Some((run_id, rest)) = rest.split_once(" manifest=sha256:") else {
        return false;
    };
    if run_id.is_empty() || !run_id.bytes().all(is_run_id_byte) {
        return false;
    }
    let Some((digest, rest)) = rest.split_once(" verify=\"gait verify ") else {
        return false;
    };
    if digest.len() != 64
        || !digest.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    {
        return false;
    }
    let Some(trailing) = rest.strip_suffix('"') else {
        return false;
    };
    trailing == run_id
}

fn is_run_id_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formatted_footer_satisfies_the_contract() {
        let footer = format_ticket_footer("run_demo", &"a".repeat(64));
        assert!(ticket_footer_matches_contract(&footer));
    }

    #[test]
    fn mismatched_run_ids_fail_the_contract() {
        let footer =
            format!("GAIT run_id=run_a manifest=sha256:{} verify=\"gait verify run_b\"", "a".repeat(64));
        assert!(!ticket_footer_matches_contract(&footer));
    }

    #[test]
    fn malformed_footers_fail_the_contract() {
        assert!(!ticket_footer_matches_contract("GAIT run_id="));
        assert!(!ticket_footer_matches_contract(&format_ticket_footer("run demo", &"a".repeat(64))));
        assert!(!ticket_footer_matches_contract(&format_ticket_footer("run_demo", "short")));
    }
}
