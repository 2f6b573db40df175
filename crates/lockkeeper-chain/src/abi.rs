//! Contract bindings for the Unlock factory, PublicLock and ERC-20

use alloy_sol_types::sol;

sol! {
    /// Unlock factory. Deploys upgradeable locks at a pinned implementation version.
    interface IUnlock {
        event NewLock(address indexed lockOwner, address indexed newLockAddress);

        function createUpgradeableLockAtVersion(
            bytes data,
            uint16 lockVersion,
            bytes[] transactions
        ) external returns (address);
    }

    /// PublicLock, the subset used for deployment, key issuance and securing
    interface IPublicLock {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function initialize(
            address _lockCreator,
            uint256 _expirationDuration,
            address _tokenAddress,
            uint256 _keyPrice,
            uint256 _maxNumberOfKeys,
            string _lockName
        ) external;

        function addLockManager(address account) external;
        function renounceLockManager() external;
        function isLockManager(address account) external view returns (bool);

        function expirationDuration() external view returns (uint256);
        function maxNumberOfKeys() external view returns (uint256);
        function maxKeysPerAddress() external view returns (uint256);
        function keyPrice() external view returns (uint256);
        function tokenAddress() external view returns (address);
        function transferFeeBasisPoints() external view returns (uint256);

        function updateLockConfig(
            uint256 _newExpirationDuration,
            uint256 _maxNumberOfKeys,
            uint256 _maxKeysPerAcccount
        ) external;
        function updateTransferFee(uint256 _transferFeeBasisPoints) external;

        function purchase(
            uint256[] _values,
            address[] _recipients,
            address[] _referrers,
            address[] _keyManagers,
            bytes[] _data
        ) external payable returns (uint256[]);

        function grantKeys(
            address[] _recipients,
            uint256[] _expirationTimestamps,
            address[] _keyManagers
        ) external returns (uint256[]);
    }

    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}
