//! Conditional requiredness rules for the built-in specification
//!
//! The specification only marks these properties `Required: "Conditional"`.
//! Each rule here encodes the sibling properties that decide it. Properties
//! whose rule cannot be stated from siblings alone stay unencoded and are
//! reported by the registry instead (e.g. DynamoDB `AttributeDefinitions`,
//! which depends on the attributes referenced by key schemas and indexes).

use stratus_core::schema::{ConditionalRequirement, Siblings};
use stratus_core::specification::ConditionalRules;
use stratus_core::value::Value;

/// How a sibling compares with an expected literal
enum Sibling {
    Absent,
    Equals,
    Differs,
    /// Present but not known until deployment
    Undetermined,
}

fn compare(siblings: &Siblings<'_>, name: &str, expected: &str) -> Sibling {
    if !siblings.is_present(name) {
        return Sibling::Absent;
    }
    match siblings.get(name) {
        None | Some(Value::Unknown(_)) => Sibling::Undetermined,
        Some(value) => match value.scalar_string() {
            Some(text) if text == expected => Sibling::Equals,
            _ => Sibling::Differs,
        },
    }
}

/// Required while `name` is absent or equal to `value`
fn when_absent_or(name: &'static str, value: &'static str) -> ConditionalRequirement {
    ConditionalRequirement::new(
        format!("required when {} is absent or {}", name, value),
        move |siblings| {
            matches!(
                compare(siblings, name, value),
                Sibling::Absent | Sibling::Equals
            )
        },
    )
}

fn subnet_cidr_block() -> ConditionalRequirement {
    ConditionalRequirement::new(
        "required unless Ipv4IpamPoolId is present or Ipv6Native is true",
        |siblings| {
            !siblings.is_present("Ipv4IpamPoolId")
                && matches!(
                    compare(siblings, "Ipv6Native", "true"),
                    Sibling::Absent | Sibling::Differs
                )
        },
    )
}

/// Rules for every conditional property the built-in specification encodes
pub fn rules() -> ConditionalRules {
    ConditionalRules::new()
        .rule(
            "AWS::EC2::VPC",
            "CidrBlock",
            ConditionalRequirement::unless_present(&["Ipv4IpamPoolId"]),
        )
        .rule("AWS::EC2::Subnet", "CidrBlock", subnet_cidr_block())
        .rule(
            "AWS::EC2::Instance",
            "ImageId",
            ConditionalRequirement::unless_present(&["LaunchTemplate"]),
        )
        .rule(
            "AWS::EC2::Route",
            "DestinationCidrBlock",
            ConditionalRequirement::unless_present(&[
                "DestinationIpv6CidrBlock",
                "DestinationPrefixListId",
            ]),
        )
        .rule(
            "AWS::EC2::VPCGatewayAttachment",
            "InternetGatewayId",
            ConditionalRequirement::unless_present(&["VpnGatewayId"]),
        )
        .rule(
            "AWS::EC2::VPCGatewayAttachment",
            "VpnGatewayId",
            ConditionalRequirement::unless_present(&["InternetGatewayId"]),
        )
        .rule("AWS::Lambda::Function", "Handler", when_absent_or("PackageType", "Zip"))
        .rule("AWS::Lambda::Function", "Runtime", when_absent_or("PackageType", "Zip"))
        .rule(
            "AWS::DynamoDB::Table",
            "ProvisionedThroughput",
            when_absent_or("BillingMode", "PROVISIONED"),
        )
}
