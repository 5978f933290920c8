//! Definitions of Solidity functions and events used during deployment and configuration

#![allow(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

use alloy_sol_types::sol;

sol! {
    interface IProxyAdmin {
        function upgrade(address proxy, address implementation) external;
        function upgradeAndCall(address proxy, address implementation, bytes memory data) external payable;
    }

    interface IAdapter {
        function initialize() external;
    }

    interface IAdaptersRegistry {
        function initialize() external;
        function setAdapterAddress(uint256 adapterId, address adapter) external;
    }

    interface IContractsFactory {
        function initialize(
            uint256 feeRate,
            address feeReceiver,
            address traderWalletImplementation,
            address usersVaultImplementation
        ) external;
        function setAdaptersRegistryAddress(address adaptersRegistryAddress) external;
        function setLensAddress(address lensAddress) external;
        function addTrader(address trader) external;
        function removeTrader(address trader) external;
        function addInvestor(address investor) external;
        function removeInvestor(address investor) external;
        function addGlobalAllowedTokens(address[] calldata tokens) external;
        function deployTraderWallet(
            address underlyingTokenAddress,
            address traderAddress,
            address owner
        ) external;
        function deployUsersVault(
            address traderWalletAddress,
            address owner,
            string memory sharesName,
            string memory sharesSymbol
        ) external;

        #[derive(Debug, PartialEq, Eq)]
        event TraderWalletDeployed(
            address indexed traderWalletAddress,
            address indexed traderAddress,
            address indexed underlyingTokenAddress
        );

        #[derive(Debug, PartialEq, Eq)]
        event UsersVaultDeployed(
            address indexed usersVaultAddress,
            address indexed traderWalletAddress
        );
    }

    interface ITraderWallet {
        function addProtocolToUse(uint256 protocolId) external;
        function addAllowedTradeTokens(address[] calldata tokens) external;
        function addGmxShortPairs(address[] calldata collateralTokens, address[] calldata indexTokens) external;
        function getAllowedTradeTokens() external view returns (address[] memory tokens);
        function setAdapterAllowanceOnToken(uint256 protocolId, address tokenAddress, bool revoke) external;
    }

    interface IUsersVault {
        function setAdapterAllowanceOnToken(uint256 protocolId, address tokenAddress, bool revoke) external;
    }

    interface IDynamicValuation {
        function initialize(address factory, address gmxObserver) external;
        function setChainlinkPriceFeed(address token, address priceFeed, uint256 heartbeat) external;
    }
}
