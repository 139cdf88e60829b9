//! Protocol configuration: the immutable parameters an engine instance is built from.

use alloy::primitives::Address;

use super::EngineConfig;
use crate::assets::TokenRegistry;
use crate::error::LendingError;

/// Everything needed to initialize a protocol instance.
#[derive(Debug, Clone)]
pub struct ProtocolConfig {
    /// Privileged administrator (protocol liquidation, automation wiring)
    pub owner: Address,
    /// Account holding all deposited collateral and repaid debt
    pub custody: Address,
    /// Allowed tokens and their price feeds
    pub registry: TokenRegistry,
    /// Risk constants and operational limits
    pub engine: EngineConfig,
    /// Token protocol-liquidation fees are delivered in (None keeps fees in custody)
    pub funding_token: Option<Address>,
}

impl ProtocolConfig {
    /// Create a configuration with default engine parameters and no funding token.
    pub fn new(owner: Address, custody: Address, registry: TokenRegistry) -> Self {
        Self {
            owner,
            custody,
            registry,
            engine: EngineConfig::default(),
            funding_token: None,
        }
    }

    /// Set engine parameters.
    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    /// Set the fee delivery token.
    pub fn with_funding_token(mut self, token: Address) -> Self {
        self.funding_token = Some(token);
        self
    }

    /// Reject zero identities and unknown funding tokens.
    pub fn validate(&self) -> Result<(), LendingError> {
        if self.owner.is_zero() || self.custody.is_zero() {
            return Err(LendingError::ZeroAddressNotAllowed);
        }
        if let Some(token) = self.funding_token {
            self.registry.ensure_allowed(token)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TokenRegistry {
        TokenRegistry::new(&[Address::repeat_byte(1)], &[Address::repeat_byte(11)]).unwrap()
    }

    #[test]
    fn test_validate() {
        let config = ProtocolConfig::new(Address::repeat_byte(0xAA), Address::repeat_byte(0xCC), registry());
        assert!(config.validate().is_ok());

        let zero_owner = ProtocolConfig::new(Address::ZERO, Address::repeat_byte(0xCC), registry());
        assert_eq!(zero_owner.validate(), Err(LendingError::ZeroAddressNotAllowed));

        let unknown_funding = config.with_funding_token(Address::repeat_byte(9));
        assert_eq!(
            unknown_funding.validate(),
            Err(LendingError::TokenNotAllowed(Address::repeat_byte(9)))
        );
    }
}
