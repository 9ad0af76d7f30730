use colored::*;
use orgscan_core::model::{Account, Finding, ScanRunResult};

/// Print the summary of one scan run to the terminal.
pub fn print_scan_summary(result: &ScanRunResult, findings: &[Finding]) {
    println!();
    println!(
        "{}",
        format!(
            " orgscan v{} — Scan run {}",
            env!("CARGO_PKG_VERSION"),
            result.execution_id
        )
        .bold()
    );
    println!();

    println!(" {}", "Accounts".bold().underline());
    println!(
        " {} Attempted: {}",
        "|-".dimmed(),
        result.accounts_attempted
    );
    println!(
        " {} Scanned:   {}",
        "|-".dimmed(),
        result.accounts_scanned().to_string().green()
    );
    println!(
        " {} Unscannable: {}",
        "|-".dimmed(),
        if result.accounts_unscannable > 0 {
            result
                .accounts_unscannable
                .to_string()
                .red()
                .bold()
                .to_string()
        } else {
            "0".to_string()
        }
    );

    for marker in &result.unscannable {
        println!(
            "   {} {} {}",
            "|".dimmed(),
            marker.account_id.yellow(),
            marker.reason.dimmed()
        );
    }
    println!();

    println!(" {}", "Findings".bold().underline());
    let (high, normal) = ScanRunResult::hri_summary(findings);
    println!(
        " {} Produced: {} ({} high-risk, {} other)",
        "|-".dimmed(),
        result.findings_produced,
        if high > 0 {
            high.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        },
        normal
    );
    println!(
        " {} Stored:   {}",
        "|-".dimmed(),
        result.findings_stored.to_string().green()
    );
    println!(
        " {} Failed:   {}",
        "|-".dimmed(),
        if result.findings_failed > 0 {
            result.findings_failed.to_string().red().bold().to_string()
        } else {
            "0".to_string()
        }
    );
    println!();

    for finding in findings {
        print_finding(finding);
    }
    if !findings.is_empty() {
        println!();
    }
}

fn print_finding(finding: &Finding) {
    let tag = if finding.hri {
        " HRI ".on_red().white().bold().to_string()
    } else {
        " --- ".dimmed().to_string()
    };

    println!(
        " {} {} {} {}",
        tag,
        finding.account_id.cyan(),
        finding.check_name.bold(),
        format!("[{}]", finding.region).dimmed()
    );
    println!("   {} {}", "|".dimmed(), finding.evidence.dimmed());
}

/// Print the active-account listing.
pub fn print_accounts(accounts: &[Account]) {
    println!();
    println!(" {}", "Active accounts".bold().underline());
    for account in accounts {
        println!(
            " {} {} {} {}",
            "|-".dimmed(),
            account.id.cyan(),
            account.name,
            account.ou_path.dimmed()
        );
    }
    println!();
    println!(" {} active accounts", accounts.len());
    println!();
}
