use slotmap::new_key_type;

new_key_type! {
    /// Identifies a piece of conducting equipment in the network arena.
    pub struct EquipmentId;

    /// Identifies a terminal. Every terminal is owned by exactly one equipment.
    pub struct TerminalId;

    /// Identifies a connectivity node joining one or more terminals.
    pub struct NodeId;
}
