//! Step definition table: the fixed step sequence for each investment method

use super::{InvestmentMethod, StepKind};

/// Blueprint for one step of a method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTemplate {
    pub kind: StepKind,
    pub title: &'static str,
    pub description: &'static str,
    pub estimated_duration_secs: u64,
}

const DIRECT_STEPS: &[StepTemplate] = &[
    StepTemplate {
        kind: StepKind::Approval,
        title: "Approve Token Spending",
        description: "Allow the investment contract to transfer your tokens",
        estimated_duration_secs: 30,
    },
    StepTemplate {
        kind: StepKind::DirectDeposit,
        title: "Deposit Investment",
        description: "Deposit funds into the property contract",
        estimated_duration_secs: 45,
    },
    StepTemplate {
        kind: StepKind::OwnershipConfirm,
        title: "Confirm Ownership",
        description: "Verify your property shares on-chain",
        estimated_duration_secs: 15,
    },
];

const CROSS_CHAIN_STEPS: &[StepTemplate] = &[
    StepTemplate {
        kind: StepKind::SwitchToSourceNetwork,
        title: "Switch to Source Network",
        description: "Connect your wallet to the network holding your funds",
        estimated_duration_secs: 15,
    },
    StepTemplate {
        kind: StepKind::Approval,
        title: "Approve Token Spending",
        description: "Allow the bridge contract to transfer your tokens",
        estimated_duration_secs: 30,
    },
    StepTemplate {
        kind: StepKind::CrossChainDeposit,
        title: "Initiate Cross-Chain Deposit",
        description: "Send the deposit message through the bridge",
        estimated_duration_secs: 60,
    },
    StepTemplate {
        kind: StepKind::RelayMonitor,
        title: "Relay Cross-Chain Message",
        description: "Waiting for the message to reach the property network",
        estimated_duration_secs: 300,
    },
    StepTemplate {
        kind: StepKind::SwitchToDestinationNetwork,
        title: "Switch to Property Network",
        description: "Connect your wallet to the network hosting the property",
        estimated_duration_secs: 15,
    },
    StepTemplate {
        kind: StepKind::OwnershipConfirm,
        title: "Confirm Ownership",
        description: "Verify your property shares on-chain",
        estimated_duration_secs: 30,
    },
];

/// New methods are added here only; execution code dispatches on [`StepKind`].
const METHOD_STEPS: &[(InvestmentMethod, &[StepTemplate])] = &[
    (InvestmentMethod::Direct, DIRECT_STEPS),
    (InvestmentMethod::CrossChain, CROSS_CHAIN_STEPS),
];

pub struct StepDefinitions;

impl StepDefinitions {
    /// Ordered step templates for `method`
    pub fn for_method(method: InvestmentMethod) -> &'static [StepTemplate] {
        METHOD_STEPS
            .iter()
            .find(|(m, _)| *m == method)
            .map(|(_, steps)| *steps)
            .unwrap_or_default()
    }

    pub fn total_estimated_duration_secs(method: InvestmentMethod) -> u64 {
        Self::for_method(method)
            .iter()
            .map(|t| t.estimated_duration_secs)
            .sum()
    }
}
