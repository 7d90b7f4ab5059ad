//! Prompt builders for the claim-check miners and the validation agent.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever prompt content changes.

use coordination::ConsensusResponse;

/// Prompt version. Bump on any prompt content change.
pub const PROMPT_VERSION: &str = "1.2.0";

const CLAIM_CHECK_INSTRUCTIONS: &str = "\
You are an independent fact-checker. Assess whether the CLAIM below is true, \
false, or uncertain given the context and evidence provided and your own knowledge.

Respond with STRICT JSON ONLY using this schema:
{\"verdict\":\"true|false|uncertain\",\"confidence\":0.0-1.0,\"disagreement\":0.0-1.0,\
\"reasoning\":\"<two or three sentences>\",\
\"citations\":[{\"source\":\"<publisher>\",\"url\":\"https://...\",\"description\":\"<what it shows>\"}]}

- `confidence` is how sure you are of the verdict.
- `disagreement` is how contested the claim is among credible sources.
- Cite only sources you are confident exist. Prefer government, academic and \
established news sources. Use an empty list rather than inventing URLs.";

const AUDIT_INSTRUCTIONS: &str = "\
You are auditing the output of a fact-checking ensemble. Several independent \
checkers assessed the CLAIM; their aggregated result is given as JSON below. \
Decide whether the aggregated verdict, its confidence, and its citations are \
reasonable for the claim.

Respond with STRICT JSON ONLY using this schema:
{\"verdict\":\"normal|abnormal|inconclusive\",\"score\":0-10,\"notes\":\"<short justification>\"}

- `normal`: the result is plausible and supported.
- `abnormal`: the verdict contradicts well-established facts, the confidence is \
unjustified, or the citations do not support it.
- `inconclusive`: you cannot tell.";

/// Build the prompt dispatched to the claim-check miners.
pub fn build_claim_prompt(claim: &str, context: Option<&str>, evidence_block: &str) -> String {
    let mut prompt = format!("{CLAIM_CHECK_INSTRUCTIONS}\n\n## CLAIM\n{}\n", claim.trim());

    if let Some(context) = context {
        prompt.push_str(&format!("\n## CONTEXT\n{}\n", context.trim()));
    }

    if !evidence_block.trim().is_empty() {
        prompt.push_str(&format!("\n## WEB EVIDENCE\n{evidence_block}\n"));
    }

    prompt
}

/// Build the audit prompt for the validation agent.
///
/// The consensus is serialized without its (not yet produced) validation.
pub fn build_audit_prompt(
    claim: &str,
    context: Option<&str>,
    consensus: &ConsensusResponse,
) -> String {
    let snapshot = consensus.clone().with_validation(None);
    let serialized = serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| {
        format!(
            "{{\"verdict\":\"{}\",\"confidence\":{}}}",
            snapshot.verdict, snapshot.confidence
        )
    });

    let mut prompt = format!("{AUDIT_INSTRUCTIONS}\n\n## CLAIM\n{}\n", claim.trim());
    if let Some(context) = context {
        prompt.push_str(&format!("\n## CONTEXT\n{}\n", context.trim()));
    }
    prompt.push_str(&format!("\n## AGGREGATED RESULT\n```json\n{serialized}\n```\n"));
    prompt
}
