//! Dependency-analysis lock: signatures, assignment targets and influencer
//! resolution over whole function bodies.

use std::collections::BTreeSet;

use recrash_harness::programs::{counter, drift, ledger};
use recrash_kernel::analysis::{analyze, AnalysisError, FunctionDecl, ParamKind};

const TRANSFER: &str = "\
def transfer(src, dst, amount, *rest, fee=1, **opts):
    total = amount + fee
    total = amount
    src.balance -= total
    dst.balance = dst.balance + total
    (a, b), c = pair
    tag = src.owner.name + src.owner
    if amount > 0: note = tag
    return tag
";

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

fn influencers(decl: &FunctionDecl, name: &str, globals: &[&str]) -> BTreeSet<String> {
    decl.dependencies
        .influencers(name, |root| decl.param(root).is_some() || globals.contains(&root))
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: signature
// ---------------------------------------------------------------------------

#[test]
fn parameter_kinds_follow_the_header() {
    let decl = analyze(TRANSFER, "transfer").unwrap();
    let kinds: Vec<(&str, ParamKind)> = decl
        .params
        .iter()
        .map(|p| (p.name.as_str(), p.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("src", ParamKind::Positional),
            ("dst", ParamKind::Positional),
            ("amount", ParamKind::Positional),
            ("rest", ParamKind::VarArgs),
            ("fee", ParamKind::KeywordOnly),
            ("opts", ParamKind::VarKeyword),
        ]
    );
    assert_eq!(decl.positional_name(2), Some("amount"));
    assert_eq!(decl.positional_name(3), None);
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: assignment targets
// ---------------------------------------------------------------------------

#[test]
fn targets_record_their_dependencies() {
    let deps = analyze(TRANSFER, "transfer").unwrap().dependencies;
    assert_eq!(deps.get("total"), Some(&set(&["amount"])));
    assert_eq!(deps.get("src.balance"), Some(&set(&["src.balance", "total"])));
    assert_eq!(deps.get("dst.balance"), Some(&set(&["dst.balance", "total"])));
    for name in ["a", "b", "c"] {
        assert_eq!(deps.get(name), Some(&set(&["pair"])), "{name}");
    }
    assert_eq!(deps.get("tag"), Some(&set(&["src.owner.name"])));
    assert_eq!(deps.get("note"), Some(&set(&["tag"])));
}

// ---------------------------------------------------------------------------
// ACCEPTANCE: influencer resolution
// ---------------------------------------------------------------------------

#[test]
fn influencers_resolve_to_parameters_and_globals() {
    let decl = analyze(TRANSFER, "transfer").unwrap();
    assert_eq!(
        influencers(&decl, "src.balance", &[]),
        set(&["amount", "src.balance"])
    );
    assert_eq!(
        influencers(&decl, "dst.balance", &[]),
        set(&["amount", "dst.balance"])
    );
    assert_eq!(influencers(&decl, "note", &[]), set(&["src.owner.name"]));
    assert!(influencers(&decl, "c", &[]).is_empty());
    assert_eq!(influencers(&decl, "c", &["pair"]), set(&["pair"]));
}

#[test]
fn bundled_programs_analyze() {
    let bump = analyze(counter::SOURCE, "bump").unwrap();
    assert_eq!(influencers(&bump, "g", &["g"]), set(&["g"]));

    let step = analyze(drift::SOURCE, "drift").unwrap();
    assert_eq!(influencers(&step, "level", &["level"]), set(&["level"]));

    let settle = analyze(ledger::SOURCE, "settle").unwrap();
    assert_eq!(
        influencers(&settle, "book.balance", &["registry"]),
        set(&["book.balance", "fee"])
    );
}

#[test]
fn unknown_function_is_reported() {
    assert_eq!(
        analyze(TRANSFER, "refund"),
        Err(AnalysisError::FunctionNotFound {
            name: "refund".into()
        })
    );
}
