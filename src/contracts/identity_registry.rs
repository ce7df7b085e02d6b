use ethers::prelude::*;

// ERC-8004 Identity Registry ABI
abigen!(
    IdentityRegistry,
    r#"[
        function newAgent(string agentDomain, address agentAddress) external returns (uint256)
    ]"#
);
