use ethers::prelude::*;

// FiatToken (USDC) surface used for ERC-3009 settlement and verification
abigen!(
    FiatToken,
    r#"[
        function transferWithAuthorization(address from, address to, uint256 value, uint256 validAfter, uint256 validBefore, bytes32 nonce, uint8 v, bytes32 r, bytes32 s) external
        function receiveWithAuthorization(address from, address to, uint256 value, uint256 validAfter, uint256 validBefore, bytes32 nonce, uint8 v, bytes32 r, bytes32 s) external
        function balanceOf(address account) external view returns (uint256)
        function authorizationState(address authorizer, bytes32 nonce) external view returns (bool)
    ]"#
);

/// USDC on Avalanche Fuji.
pub const FUJI_USDC_ADDRESS: &str = "0x5425890298aed601595a70AB815c96711a31Bc65";
