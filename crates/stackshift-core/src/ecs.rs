//! Container images referenced by active ECS task definitions.

use crate::aws;
use crate::error::{Result, StackshiftError};
use crate::exec::{CommandRunner, CommandSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRow {
    pub family: String,
    pub revision: u32,
    pub container: String,
    pub image: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTaskDefinitions {
    #[serde(default)]
    task_definition_arns: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeTaskDefinition {
    task_definition: TaskDefinition,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskDefinition {
    family: String,
    revision: u32,
    #[serde(default)]
    container_definitions: Vec<ContainerDefinition>,
}

#[derive(Deserialize)]
struct ContainerDefinition {
    name: String,
    #[serde(default)]
    image: String,
}

fn run_json<T: DeserializeOwned>(runner: &mut dyn CommandRunner, spec: &CommandSpec) -> Result<T> {
    let stdout = runner.run(spec).into_result(spec)?;
    serde_json::from_str(&stdout).map_err(|e| StackshiftError::UnexpectedOutput {
        command: spec.display_line(),
        reason: e.to_string(),
    })
}

/// One row per container across every active task definition, ordered by
/// family, then revision, then container name.
pub fn list_images(
    runner: &mut dyn CommandRunner,
    region: &str,
    family_prefix: Option<&str>,
) -> Result<Vec<ImageRow>> {
    let list: ListTaskDefinitions =
        run_json(runner, &aws::ecs_list_task_definitions(region, family_prefix))?;

    let mut rows = Vec::new();
    for arn in &list.task_definition_arns {
        let described: DescribeTaskDefinition =
            run_json(runner, &aws::ecs_describe_task_definition(arn, region))?;
        let td = described.task_definition;
        for container in td.container_definitions {
            rows.push(ImageRow {
                family: td.family.clone(),
                revision: td.revision,
                container: container.name,
                image: container.image,
            });
        }
    }
    rows.sort_by(|a, b| {
        (&a.family, a.revision, &a.container).cmp(&(&b.family, b.revision, &b.container))
    });
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Tool;
    use crate::testing::ScriptedRunner;

    const ARN_API: &str = "arn:aws:ecs:us-east-1:1:task-definition/api:7";
    const ARN_WORKER: &str = "arn:aws:ecs:us-east-1:1:task-definition/worker:2";

    fn runner() -> ScriptedRunner {
        ScriptedRunner::new()
            .stdout(
                Tool::Aws,
                &["ecs", "list-task-definitions"],
                &format!(r#"{{"taskDefinitionArns":["{ARN_WORKER}","{ARN_API}"]}}"#),
            )
            .stdout(
                Tool::Aws,
                &["ecs", "describe-task-definition", "--task-definition", ARN_API],
                r#"{"taskDefinition":{"family":"api","revision":7,"containerDefinitions":[
                    {"name":"web","image":"acme/api:1.4"},
                    {"name":"envoy","image":"envoyproxy/envoy:v1.29"}]}}"#,
            )
            .stdout(
                Tool::Aws,
                &["ecs", "describe-task-definition", "--task-definition", ARN_WORKER],
                r#"{"taskDefinition":{"family":"worker","revision":2,"containerDefinitions":[
                    {"name":"worker","image":"acme/worker:0.9"}]}}"#,
            )
    }

    #[test]
    fn collects_rows_sorted() {
        let mut r = runner();
        let rows = list_images(&mut r, "us-east-1", None).unwrap();
        let flat: Vec<(&str, u32, &str, &str)> = rows
            .iter()
            .map(|r| (r.family.as_str(), r.revision, r.container.as_str(), r.image.as_str()))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("api", 7, "envoy", "envoyproxy/envoy:v1.29"),
                ("api", 7, "web", "acme/api:1.4"),
                ("worker", 2, "worker", "acme/worker:0.9"),
            ]
        );
    }

    #[test]
    fn family_prefix_is_forwarded() {
        let mut r = runner();
        list_images(&mut r, "us-east-1", Some("api")).unwrap();
        let list = r.find(Tool::Aws, &["ecs", "list-task-definitions"]).unwrap();
        assert_eq!(list.spec.flag_value("--family-prefix"), Some("api"));
        assert_eq!(list.spec.flag_value("--status"), Some("ACTIVE"));
    }

    #[test]
    fn empty_listing_yields_no_rows() {
        let mut r = ScriptedRunner::new().stdout(
            Tool::Aws,
            &["ecs", "list-task-definitions"],
            r#"{"taskDefinitionArns":[]}"#,
        );
        assert!(list_images(&mut r, "us-east-1", None).unwrap().is_empty());
        assert_eq!(r.calls.len(), 1);
    }

    #[test]
    fn garbage_output_is_unexpected() {
        let mut r = ScriptedRunner::new().stdout(Tool::Aws, &["ecs"], "not json");
        assert!(matches!(
            list_images(&mut r, "us-east-1", None),
            Err(StackshiftError::UnexpectedOutput { .. })
        ));
    }
}
