// Sample compose file (`config generate`)

const SAMPLE: &str = r#"# stack-compose file
#
# Jobs with the same `order` run concurrently; lower orders deploy first
# and are destroyed last. Stacks inside a job run one after another
# (reversed on destroy).
description: Sample three-tier environment

vars:
  AWS_REGION: us-east-1
  AWS_PROFILE: default

jobs:
  network:
    order: 1
    stacks:
      - stack_name: sample-vpc
        template_file: templates/vpc.yml
        parameters:
          CidrBlock: 10.0.0.0/16
        tags:
          team: platform
      - stack_name: sample-subnets
        template_file: templates/subnets.yml

  security:
    order: 1
    stacks:
      - stack_name: sample-iam
        template_file: templates/iam.yml
        capabilities:
          - CAPABILITY_NAMED_IAM

  app:
    order: 2
    stacks:
      - stack_name: sample-service
        template_file: templates/service.yml
        parameters:
          DesiredCount: "2"
"#;

/// A commented, valid compose file to start from
pub fn sample_compose() -> &'static str {
    SAMPLE
}
