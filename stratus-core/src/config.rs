//! Engine configuration

use crate::finding::Severity;

/// Deployment context used for pseudo parameters
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Region for `AWS::Region` and `Fn::GetAZs` (default: us-east-1)
    pub region: String,

    /// Account for `AWS::AccountId` (default: 123456789012)
    pub account_id: String,

    /// Stack name for `AWS::StackName` and `AWS::StackId` (default: stratus-stack)
    pub stack_name: String,

    /// Severity of properties missing from a resource's schema (default: warning)
    pub unknown_property_severity: Severity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "123456789012".to_string(),
            stack_name: "stratus-stack".to_string(),
            unknown_property_severity: Severity::Warning,
        }
    }
}

impl EngineConfig {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_stack_name(mut self, stack_name: impl Into<String>) -> Self {
        self.stack_name = stack_name.into();
        self
    }

    /// Partition derived from the region
    pub fn partition(&self) -> &'static str {
        if self.region.starts_with("cn-") {
            "aws-cn"
        } else if self.region.starts_with("us-gov-") {
            "aws-us-gov"
        } else {
            "aws"
        }
    }

    pub fn url_suffix(&self) -> &'static str {
        if self.region.starts_with("cn-") {
            "amazonaws.com.cn"
        } else {
            "amazonaws.com"
        }
    }

    /// Placeholder stack id in the configured region and account
    pub fn stack_id(&self) -> String {
        format!(
            "arn:{}:cloudformation:{}:{}:stack/{}/00000000-0000-0000-0000-000000000000",
            self.partition(),
            self.region,
            self.account_id,
            self.stack_name
        )
    }

    /// Availability zones reported by `Fn::GetAZs` for a region
    pub fn availability_zones(region: &str) -> Vec<String> {
        ["a", "b", "c"]
            .iter()
            .map(|suffix| format!("{}{}", region, suffix))
            .collect()
    }
}
