//! Prompt templates for the resource pipeline.
//!
//! Each pipeline step has a user prompt template; all steps share one system
//! prompt. Templates carry `{resource_name}`, `{working_directory}` and
//! `{current_date}` placeholders filled by [`render`].

use chrono::Utc;

/// Shared system prompt for every sampling run.
pub const SYSTEM_PROMPT: &str = "You are an expert infrastructure engineer working with Terraform \
and the AWS Cloud Control provider (awscc). You work inside a sandboxed environment with bash and \
file-editing tools. Always verify your work by running the relevant terraform commands before \
declaring a step complete. Create a marker file only after the step's goal has genuinely been \
achieved.";

/// Author a working Terraform configuration for the resource.
pub const USER_PROMPT_CREATE: &str = "Your task is to produce a minimal, working Terraform \
example for the resource type `{resource_name}` using the awscc provider.

Work in the directory {working_directory}. Today's date is {current_date}.

Steps:
1. Inspect any existing files in the working directory.
2. Write a `main.tf` that declares the provider and a single `{resource_name}` resource with \
sensible, minimal attributes. Prefer hardcoded example values over variables.
3. Run `terraform init` and `terraform plan` and fix any errors.
4. Run `terraform apply -auto-approve` and confirm the resource is created.
5. When the apply succeeds, create an empty file named `created.marker` in the working directory.

Do not create the marker if the apply failed.";

/// Repair a previously failing configuration.
pub const USER_PROMPT_UPDATE: &str = "A previous attempt at a Terraform example for \
`{resource_name}` (awscc provider) exists in {working_directory} but did not work. Today's date \
is {current_date}.

Steps:
1. Read the existing `main.tf` and any state or error output present.
2. Diagnose why the configuration fails and rewrite `main.tf` as needed.
3. Run `terraform init`, `terraform plan` and `terraform apply -auto-approve` until the apply \
succeeds.
4. When the apply succeeds, create an empty file named `updated.marker` in the working directory.

Do not create the marker if the apply failed.";

/// Tear down the live resource.
pub const USER_PROMPT_DELETE: &str = "The Terraform configuration in {working_directory} has \
been applied and `{resource_name}` exists in the account. Today's date is {current_date}.

Steps:
1. Run `terraform destroy -auto-approve` in the working directory.
2. If the destroy fails, diagnose and fix the cause, then retry. Do not edit the resource \
definition in ways that would change what the example demonstrates.
3. When the destroy succeeds and the state is empty, create an empty file named \
`deleted.marker` in the working directory.

Do not create the marker if resources remain in the state.";

/// Review the example for quality and correctness.
pub const USER_PROMPT_REVIEW: &str = "Review the Terraform example for `{resource_name}` in \
{working_directory}. Today's date is {current_date}.

Check that:
1. `main.tf` demonstrates the resource clearly, with minimal unrelated noise.
2. Attribute values are realistic and do not leak account-specific identifiers.
3. The configuration passes `terraform validate`.

Fix anything that falls short. When the example is in good shape, create an empty file named \
`reviewed.marker` in the working directory.";

/// Strip scaffolding so only the example remains.
pub const USER_PROMPT_CLEANER: &str = "Clean up the working directory {working_directory} for \
`{resource_name}`. Today's date is {current_date}.

Steps:
1. Remove helper files that are not part of the example: crash logs, backup files, leftover \
scripts. Keep `main.tf`, marker files, and any `summary.txt`.
2. Ensure `main.tf` contains only the provider block and the example resource.
3. Run `terraform validate` to confirm the cleaned configuration is still valid.
4. When done, create an empty file named `cleaned.marker` in the working directory.";

/// Write the prose summary used in published documentation.
pub const USER_PROMPT_SUMMARY: &str = "Write a short documentation summary for the Terraform \
example of `{resource_name}` in {working_directory}. Today's date is {current_date}.

Steps:
1. Read `main.tf` and understand what the example provisions.
2. Write one or two plain-English paragraphs describing what the example creates and any \
notable attribute choices, into a file named `summary.txt` in the working directory. Do not \
use Markdown headings.
3. When `summary.txt` is written and non-empty, create an empty file named `summary.marker` in \
the working directory.";

/// Fill a template's placeholders.
///
/// Unknown placeholders are left untouched so template typos surface in the
/// rendered output rather than vanishing silently.
pub fn render(template: &str, resource_name: &str, working_directory: &str) -> String {
    template
        .replace("{resource_name}", resource_name)
        .replace("{working_directory}", working_directory)
        .replace("{current_date}", &Utc::now().format("%Y-%m-%d").to_string())
}
