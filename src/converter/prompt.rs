use crate::llm::Message;

pub const SYSTEM_PROMPT: &str = "You are an expert code converter specializing in migrating legacy ColdFusion applications to modern frameworks.";

/// Build the user instruction for one conversion.
///
/// # Arguments
/// * `label` - Display label of the target, or the raw key when it is unknown
/// * `target_key` - Target key as submitted by the form
/// * `extra_instructions` - Free text appended after the requirements, may be empty
/// * `source_text` - ColdFusion source, embedded verbatim in a fenced block
pub fn build_user_prompt(
    label: &str,
    target_key: &str,
    extra_instructions: &str,
    source_text: &str,
) -> String {
    format!(
        "You are an expert developer skilled in ColdFusion and {label}.

Please convert the following ColdFusion code to {target_key}.

Requirements:
1. Maintain the same functionality and logic
2. Follow best practices for {target_key}
3. Include necessary imports/dependencies
4. Add comments explaining complex conversions
5. Ensure the code is production-ready
6. Handle any ColdFusion-specific features appropriately

{extra_instructions}

ColdFusion Code to Convert:
```coldfusion
{source_text}
```

Please provide:
1. The converted code
2. A brief explanation of key changes made
3. Any additional setup or dependencies needed
"
    )
}

/// System + user conversation sent to the completion endpoint
pub fn build_messages(
    label: &str,
    target_key: &str,
    extra_instructions: &str,
    source_text: &str,
) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(build_user_prompt(
            label,
            target_key,
            extra_instructions,
            source_text,
        )),
    ]
}
